//! End-to-end tests for the Sundry storefront.
//!
//! Flows run against the in-memory backend and change feed from the
//! storefront's `test-util` feature, so no hosted project is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p sundry-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `guest_cart` - Guest cart kept in visitor storage
//! - `signed_in_cart` - Remote cart rows and the cart cache
//! - `checkout` - Order placement and partial failures
//! - `realtime_sync` - Cache invalidation from change events
//! - `sign_in` - Guest cart handling at sign-in

#![allow(clippy::unwrap_used)]

use sundry_core::{Price, ProductId, Quantity, UserId};
use sundry_storefront::backend::{MemoryBackend, Product, Table};
use sundry_storefront::cart::{CartCache, CartResolver, MemoryStorage, RemoteCartStore};

/// Resolver over the in-memory stores.
pub type TestResolver = CartResolver<MemoryStorage, MemoryBackend>;

/// One shop's worth of in-memory state: backend tables, a visitor's storage
/// and the signed-in cart cache.
#[derive(Clone, Default)]
pub struct TestShop {
    pub backend: MemoryBackend,
    pub storage: MemoryStorage,
    pub cache: CartCache,
}

impl TestShop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a product priced at `cents` into the `products` table.
    pub fn product(&self, name: &str, cents: i64) -> Product {
        let product = Product {
            id: ProductId::generate(),
            name: name.to_string(),
            description: None,
            price: Price::from_cents(cents),
            image_url: None,
            category: "general".to_string(),
            discount: None,
            created_at: None,
            updated_at: None,
        };
        self.backend.seed(Table::Products, &[&product]).unwrap();
        product
    }

    /// The cart as a guest sees it.
    #[must_use]
    pub fn guest(&self) -> TestResolver {
        CartResolver::resolve(
            None,
            self.storage.clone(),
            self.backend.clone(),
            self.cache.clone(),
        )
    }

    /// The cart as `user` sees it.
    #[must_use]
    pub fn signed_in(&self, user: UserId) -> TestResolver {
        CartResolver::resolve(
            Some(user),
            self.storage.clone(),
            self.backend.clone(),
            self.cache.clone(),
        )
    }

    /// Direct access to `user`'s remote cart rows.
    #[must_use]
    pub fn remote(&self, user: UserId) -> RemoteCartStore<MemoryBackend> {
        RemoteCartStore::new(self.backend.clone(), user, self.cache.clone())
    }
}

/// Shorthand for a valid quantity.
#[must_use]
pub fn qty(n: i64) -> Quantity {
    Quantity::new(n).unwrap()
}
