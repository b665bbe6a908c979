//! Cart line quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// The requested value is zero or negative.
    #[error("quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    /// The requested value does not fit the storage column.
    #[error("quantity {0} is too large")]
    TooLarge(i64),
}

/// Number of units on a cart or order line.
///
/// A `Quantity` is always at least 1. Requests that would drop a line to
/// zero or below are removals, never a stored quantity, so callers decide
/// what to do with the `Err` case of [`Quantity::new`].
///
/// ```
/// use sundry_core::Quantity;
///
/// assert_eq!(Quantity::new(3).unwrap().get(), 3);
/// assert!(Quantity::new(0).is_err());
/// assert!(Quantity::new(-2).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Create a quantity from a requested value.
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::NotPositive` for values below 1 and
    /// `QuantityError::TooLarge` for values that overflow an `i32` column.
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value < 1 {
            return Err(QuantityError::NotPositive(value));
        }
        if value > i64::from(i32::MAX) {
            return Err(QuantityError::TooLarge(value));
        }
        u32::try_from(value)
            .map(Self)
            .map_err(|_| QuantityError::TooLarge(value))
    }

    /// Get the number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Add two quantities, saturating at the column limit.
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        let max = i32::MAX.unsigned_abs();
        Self(self.0.saturating_add(other.0).min(max))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Quantity> for i64 {
    fn from(quantity: Quantity) -> Self {
        Self::from(quantity.0)
    }
}

// Rows written by other clients are validated on the way in.
impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}
