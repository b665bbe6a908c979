//! Cart state for guests and signed-in shoppers.
//!
//! # Architecture
//!
//! - A guest cart lives in the visitor's session under a single key
//!   ([`LocalCartStore`]); every mutation rewrites the whole list
//! - A signed-in cart lives in the backend's `cart_items` table
//!   ([`RemoteCartStore`]), read through a per-user [`CartCache`]
//! - [`CartResolver`] picks the store once from the authentication state and
//!   exposes uniform add/update/remove/subtotal operations
//!
//! Line items carry a [`LineKey`] so callers can address a line without
//! knowing which store produced it.

mod cache;
mod local;
mod migration;
mod remote;
mod resolver;
mod storage;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sundry_core::{CartLineId, Price, ProductId, Quantity, QuantityError};

use crate::backend::{BackendError, Product};

pub use cache::CartCache;
pub use local::{GUEST_CART_KEY, GuestCartLine, LocalCartStore};
pub use migration::{GuestCartPolicy, MigrationReport, ParsePolicyError, migrate_guest_cart};
pub use remote::RemoteCartStore;
pub use resolver::{CartAction, CartError, CartResolver, ResolvedStore};
#[cfg(any(test, feature = "test-util"))]
pub use storage::MemoryStorage;
pub use storage::{KeyValueStore, StorageError};

/// Identifies a line within the active store.
///
/// Signed-in lines are addressed by row id, guest lines by product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LineKey {
    Line(CartLineId),
    Product(ProductId),
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(id) => write!(f, "line:{id}"),
            Self::Product(id) => write!(f, "product:{id}"),
        }
    }
}

/// A cart line with its product embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub key: LineKey,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub product: Product,
    /// Pre-discount unit price, when the product is on sale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_price: Option<Price>,
}

impl CartItem {
    #[must_use]
    pub fn new(key: LineKey, quantity: Quantity, product: Product) -> Self {
        Self {
            key,
            product_id: product.id,
            quantity,
            list_price: product.list_price(),
            product,
        }
    }

    /// Current product price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Sum of line totals at current product prices.
#[must_use]
pub fn subtotal(items: &[CartItem]) -> Price {
    items.iter().map(CartItem::line_total).sum()
}

/// Everything a cart view needs in one read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub subtotal: Price,
    /// Total units across lines.
    pub item_count: u64,
    pub is_authenticated: bool,
}

impl CartSnapshot {
    #[must_use]
    pub fn new(items: Vec<CartItem>, is_authenticated: bool) -> Self {
        let subtotal = subtotal(&items);
        let item_count = items.iter().map(|item| u64::from(item.quantity.get())).sum();
        Self {
            items,
            subtotal,
            item_count,
            is_authenticated,
        }
    }
}

/// Errors raised by a cart store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Visitor storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The key addresses the other kind of store.
    #[error("{key} does not address a {expected} cart line")]
    KeyMismatch { key: LineKey, expected: &'static str },

    /// The requested quantity cannot be stored.
    #[error(transparent)]
    InvalidQuantity(#[from] QuantityError),
}

/// Storage of one shopper's cart lines.
///
/// Quantities reaching a store are already validated; removal of lines
/// dropping below one is the resolver's job.
pub trait CartStore: Send + Sync {
    /// Whether lines belong to a signed-in user.
    fn is_authenticated(&self) -> bool;

    /// Current lines, in insertion order.
    fn items(&self) -> impl Future<Output = Result<Vec<CartItem>, StoreError>> + Send;

    /// Add `quantity` of `product`, merging into an existing line.
    fn add_item(
        &self,
        product: &Product,
        quantity: Quantity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Set the quantity of the line at `key`.
    fn set_quantity(
        &self,
        key: LineKey,
        quantity: Quantity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the line at `key`.
    fn remove_item(&self, key: LineKey) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove every line.
    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_support::{product, qty};
    use super::*;

    fn item(cents: i64, quantity: i64) -> CartItem {
        let product = product("Thing", cents);
        CartItem::new(LineKey::Product(product.id), qty(quantity), product)
    }

    #[test]
    fn test_subtotal_sums_line_totals() {
        let items = vec![item(1000, 2), item(550, 3)];
        assert_eq!(subtotal(&items), Price::from_cents(3650));
    }

    #[test]
    fn test_subtotal_empty_is_zero() {
        assert_eq!(subtotal(&[]), Price::ZERO);
    }

    #[test]
    fn test_snapshot_counts_units() {
        let snapshot = CartSnapshot::new(vec![item(1000, 2), item(550, 3)], false);
        assert_eq!(snapshot.item_count, 5);
        assert_eq!(snapshot.subtotal, Price::from_cents(3650));
        assert!(!snapshot.is_authenticated);
    }

    #[test]
    fn test_line_key_wire_format() {
        let id = ProductId::generate();
        let json = serde_json::to_value(LineKey::Product(id)).unwrap();
        assert_eq!(json["kind"], "product");
        assert_eq!(json["id"], id.to_string());

        let parsed: LineKey = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, LineKey::Product(id));
    }

    #[test]
    fn test_item_carries_list_price_when_on_sale() {
        let mut on_sale = product("Sale", 1000);
        on_sale.discount = Some(rust_decimal::Decimal::from(20));
        let sale_item = CartItem::new(LineKey::Product(on_sale.id), qty(1), on_sale);

        let json = serde_json::to_value(&sale_item).unwrap();
        let list_price: Price = serde_json::from_value(json["list_price"].clone()).unwrap();
        assert_eq!(list_price, Price::from_cents(1200));

        let full_price = serde_json::to_value(item(1000, 1)).unwrap();
        assert!(full_price.get("list_price").is_none());
    }
}
