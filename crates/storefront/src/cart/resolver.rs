//! Cart State Resolver: one cart API over the guest and signed-in stores.

use std::fmt;

use thiserror::Error;
use tracing::{error, instrument, warn};

use sundry_core::{Price, Quantity, QuantityError, UserId};

use super::cache::CartCache;
use super::local::LocalCartStore;
use super::remote::RemoteCartStore;
use super::storage::KeyValueStore;
use super::{CartItem, CartSnapshot, CartStore, LineKey, StoreError, subtotal};
use crate::backend::{Backend, Product};
use crate::notice::Notice;

/// A cart operation, as reported in failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartAction {
    Load,
    Add,
    UpdateQuantity,
    Remove,
}

impl CartAction {
    /// Message shown to the shopper when the action fails.
    #[must_use]
    pub const fn failure_message(self) -> &'static str {
        match self {
            Self::Load => "Failed to load cart",
            Self::Add => "Failed to add item to cart",
            Self::UpdateQuantity => "Failed to update quantity",
            Self::Remove => "Failed to remove item",
        }
    }
}

impl fmt::Display for CartAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load cart",
            Self::Add => "add item",
            Self::UpdateQuantity => "update quantity",
            Self::Remove => "remove item",
        })
    }
}

/// A failed cart action. The cart is left as it was.
#[derive(Debug, Error)]
#[error("failed to {action}: {source}")]
pub struct CartError {
    pub action: CartAction,
    #[source]
    pub source: StoreError,
}

impl CartError {
    /// The error notification for the shopper.
    #[must_use]
    pub fn notice(&self) -> Notice {
        Notice::error(self.action.failure_message())
    }

    /// Whether the request itself was at fault rather than a dependency.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self.source,
            StoreError::KeyMismatch { .. } | StoreError::InvalidQuantity(_)
        )
    }
}

/// The store chosen for the current authentication state.
#[derive(Clone)]
pub enum ResolvedStore<S, B> {
    Guest(LocalCartStore<S>),
    SignedIn(RemoteCartStore<B>),
}

impl<S: KeyValueStore, B: Backend> CartStore for ResolvedStore<S, B> {
    fn is_authenticated(&self) -> bool {
        match self {
            Self::Guest(store) => store.is_authenticated(),
            Self::SignedIn(store) => store.is_authenticated(),
        }
    }

    async fn items(&self) -> Result<Vec<CartItem>, StoreError> {
        match self {
            Self::Guest(store) => store.items().await,
            Self::SignedIn(store) => store.items().await,
        }
    }

    async fn add_item(&self, product: &Product, quantity: Quantity) -> Result<(), StoreError> {
        match self {
            Self::Guest(store) => store.add_item(product, quantity).await,
            Self::SignedIn(store) => store.add_item(product, quantity).await,
        }
    }

    async fn set_quantity(&self, key: LineKey, quantity: Quantity) -> Result<(), StoreError> {
        match self {
            Self::Guest(store) => store.set_quantity(key, quantity).await,
            Self::SignedIn(store) => store.set_quantity(key, quantity).await,
        }
    }

    async fn remove_item(&self, key: LineKey) -> Result<(), StoreError> {
        match self {
            Self::Guest(store) => store.remove_item(key).await,
            Self::SignedIn(store) => store.remove_item(key).await,
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match self {
            Self::Guest(store) => store.clear().await,
            Self::SignedIn(store) => store.clear().await,
        }
    }
}

/// Uniform cart operations for the current visitor.
///
/// Failures are logged and returned as [`CartError`]s carrying the
/// notification to show; nothing is retried or rolled back.
#[derive(Clone)]
pub struct CartResolver<S, B> {
    store: ResolvedStore<S, B>,
}

impl<S: KeyValueStore, B: Backend> CartResolver<S, B> {
    /// Pick the store for `user`: the remote table when signed in, visitor
    /// storage otherwise.
    pub fn resolve(user: Option<UserId>, storage: S, backend: B, cache: CartCache) -> Self {
        let store = match user {
            Some(user_id) => {
                ResolvedStore::SignedIn(RemoteCartStore::new(backend, user_id, cache))
            }
            None => ResolvedStore::Guest(LocalCartStore::new(storage)),
        };
        Self { store }
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    /// Current line items.
    ///
    /// # Errors
    ///
    /// Returns error if the active store cannot be read.
    pub async fn items(&self) -> Result<Vec<CartItem>, CartError> {
        self.store
            .items()
            .await
            .map_err(|e| failed(CartAction::Load, e))
    }

    /// Σ price × quantity over the current items.
    ///
    /// # Errors
    ///
    /// Returns error if the active store cannot be read.
    pub async fn subtotal(&self) -> Result<Price, CartError> {
        Ok(subtotal(&self.items().await?))
    }

    /// Items, subtotal and counts in one read.
    ///
    /// # Errors
    ///
    /// Returns error if the active store cannot be read.
    pub async fn snapshot(&self) -> Result<CartSnapshot, CartError> {
        Ok(CartSnapshot::new(self.items().await?, self.is_authenticated()))
    }

    /// Add `quantity` of `product`.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the change.
    #[instrument(skip(self, product), fields(product_id = %product.id, authenticated = self.is_authenticated()))]
    pub async fn add_item(&self, product: &Product, quantity: Quantity) -> Result<Notice, CartError> {
        self.store
            .add_item(product, quantity)
            .await
            .map_err(|e| failed(CartAction::Add, e))?;
        Ok(Notice::success("Added to cart!"))
    }

    /// Set the line at `key` to `new_quantity`; below one removes the line.
    ///
    /// Returns the removal notification when the line was removed.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the change or the quantity is too
    /// large to store.
    #[instrument(skip(self), fields(authenticated = self.is_authenticated()))]
    pub async fn update_quantity(
        &self,
        key: LineKey,
        new_quantity: i64,
    ) -> Result<Option<Notice>, CartError> {
        let quantity = match Quantity::new(new_quantity) {
            Ok(quantity) => quantity,
            Err(QuantityError::NotPositive(_)) => return self.remove_item(key).await.map(Some),
            Err(e) => return Err(failed(CartAction::UpdateQuantity, e.into())),
        };

        self.store
            .set_quantity(key, quantity)
            .await
            .map_err(|e| failed(CartAction::UpdateQuantity, e))?;
        Ok(None)
    }

    /// Remove the line at `key`.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the change.
    #[instrument(skip(self), fields(authenticated = self.is_authenticated()))]
    pub async fn remove_item(&self, key: LineKey) -> Result<Notice, CartError> {
        self.store
            .remove_item(key)
            .await
            .map_err(|e| failed(CartAction::Remove, e))?;
        Ok(Notice::success("Item removed from cart"))
    }
}

fn failed(action: CartAction, source: StoreError) -> CartError {
    let err = CartError { action, source };
    if err.is_client_error() {
        warn!(%action, error = %err.source, "Rejected cart request");
    } else {
        error!(%action, error = %err.source, "Cart action failed");
    }
    err
}
