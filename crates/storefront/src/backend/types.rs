//! Row types of the storefront schema.
//!
//! These mirror the tables exposed by the hosted backend. Rows read back are
//! validated on deserialization (quantities below one are rejected by
//! [`Quantity`]).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sundry_core::{
    CartLineId, OrderId, OrderLineId, OrderStatus, Price, ProductId, Quantity, UserId,
};

// =============================================================================
// Products
// =============================================================================

/// A catalog product. Read-only from the storefront's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub image_url: Option<String>,
    pub category: String,
    /// Percentage off, shown as a badge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Pre-discount price displayed struck through, if the product is on sale.
    #[must_use]
    pub fn list_price(&self) -> Option<Price> {
        self.discount
            .filter(|d| !d.is_zero())
            .map(|d| self.price.list_price(d).round_to_cents())
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A `cart_items` row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineRecord {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A `cart_items` row with its product embedded (`*,product:products(*)`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CartLineWithProduct {
    #[serde(flatten)]
    pub line: CartLineRecord,
    pub product: Product,
}

/// Insert payload for `cart_items`.
#[derive(Debug, Clone, Serialize)]
pub struct NewCartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// Update payload setting a line's quantity.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuantityPatch {
    pub quantity: Quantity,
}

// =============================================================================
// Orders
// =============================================================================

/// An `orders` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Derived from the cart subtotal at checkout; not authoritative.
    pub total_amount: Price,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for `orders`.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total_amount: Price,
    pub status: OrderStatus,
}

/// An `order_items` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Unit price snapshot, decoupled from later product price changes.
    pub price_at_time: Price,
}

/// Insert payload for `order_items`.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub price_at_time: Price,
}
