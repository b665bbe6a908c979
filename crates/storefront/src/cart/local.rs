//! Guest cart kept in visitor storage.

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use sundry_core::{ProductId, Quantity};

use super::storage::{KeyValueStore, StorageError};
use super::{CartItem, CartStore, LineKey, StoreError};
use crate::backend::Product;

/// Storage key holding the guest cart as a JSON array.
pub const GUEST_CART_KEY: &str = "guestCart";

/// A guest cart line as stored: the product is copied in at add time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCartLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub product: Product,
}

impl From<GuestCartLine> for CartItem {
    fn from(line: GuestCartLine) -> Self {
        Self::new(LineKey::Product(line.product_id), line.quantity, line.product)
    }
}

/// Cart store over a visitor's [`KeyValueStore`].
///
/// The stored value is always the serialization of the full line list; it is
/// rewritten after every mutation.
#[derive(Debug, Clone)]
pub struct LocalCartStore<S> {
    storage: S,
}

impl<S: KeyValueStore> LocalCartStore<S> {
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Stored lines. An unreadable value is discarded and reads as empty.
    ///
    /// # Errors
    ///
    /// Returns error if the storage itself fails.
    pub async fn load(&self) -> Result<Vec<GuestCartLine>, StorageError> {
        let Some(raw) = self.storage.get(GUEST_CART_KEY).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(lines) => Ok(lines),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable guest cart");
                self.storage.remove(GUEST_CART_KEY).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Replace the stored lines with `lines`.
    ///
    /// # Errors
    ///
    /// Returns error if the lines cannot be written.
    pub async fn save(&self, lines: &[GuestCartLine]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(lines)?;
        self.storage.set(GUEST_CART_KEY, raw).await
    }
}

fn product_key(key: LineKey) -> Result<ProductId, StoreError> {
    match key {
        LineKey::Product(id) => Ok(id),
        LineKey::Line(_) => Err(StoreError::KeyMismatch {
            key,
            expected: "guest",
        }),
    }
}

impl<S: KeyValueStore> CartStore for LocalCartStore<S> {
    fn is_authenticated(&self) -> bool {
        false
    }

    async fn items(&self) -> Result<Vec<CartItem>, StoreError> {
        Ok(self.load().await?.into_iter().map(CartItem::from).collect())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn add_item(&self, product: &Product, quantity: Quantity) -> Result<(), StoreError> {
        let mut lines = self.load().await?;

        match lines.iter_mut().find(|line| line.product_id == product.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => lines.push(GuestCartLine {
                product_id: product.id,
                quantity,
                product: product.clone(),
            }),
        }

        Ok(self.save(&lines).await?)
    }

    #[instrument(skip(self))]
    async fn set_quantity(&self, key: LineKey, quantity: Quantity) -> Result<(), StoreError> {
        let product_id = product_key(key)?;
        let mut lines = self.load().await?;

        for line in lines.iter_mut().filter(|line| line.product_id == product_id) {
            line.quantity = quantity;
        }

        Ok(self.save(&lines).await?)
    }

    #[instrument(skip(self))]
    async fn remove_item(&self, key: LineKey) -> Result<(), StoreError> {
        let product_id = product_key(key)?;
        let mut lines = self.load().await?;
        lines.retain(|line| line.product_id != product_id);
        Ok(self.save(&lines).await?)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(self.storage.remove(GUEST_CART_KEY).await?)
    }
}
