//! Signed-in cart kept in the backend's `cart_items` table.

use tracing::{debug, instrument};

use sundry_core::{CartLineId, Quantity, UserId};

use super::cache::CartCache;
use super::{CartItem, CartStore, LineKey, StoreError};
use crate::backend::{
    Backend, BackendError, CartLineRecord, CartLineWithProduct, Filter, NewCartLine, Product,
    QuantityPatch, Select, Table,
};

impl From<CartLineWithProduct> for CartItem {
    fn from(row: CartLineWithProduct) -> Self {
        Self::new(LineKey::Line(row.line.id), row.line.quantity, row.product)
    }
}

/// Cart store over one user's `cart_items` rows.
///
/// Reads go through the shared [`CartCache`]; every successful mutation
/// drops the user's entry.
#[derive(Clone)]
pub struct RemoteCartStore<B> {
    backend: B,
    user_id: UserId,
    cache: CartCache,
}

impl<B: Backend> RemoteCartStore<B> {
    pub const fn new(backend: B, user_id: UserId, cache: CartCache) -> Self {
        Self {
            backend,
            user_id,
            cache,
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The cart-items query: own rows with the product embedded, oldest first.
    fn query(&self) -> Select {
        Select::from(Table::CartItems)
            .embed("product", Table::Products, "product_id")
            .eq("user_id", self.user_id)
            .order_by("created_at", true)
    }

    async fn fetch(&self) -> Result<Vec<CartItem>, BackendError> {
        let rows: Vec<CartLineWithProduct> = self.backend.select(&self.query()).await?;
        Ok(rows.into_iter().map(CartItem::from).collect())
    }

    async fn existing_line(
        &self,
        product: &Product,
    ) -> Result<Option<CartLineRecord>, BackendError> {
        let rows: Vec<CartLineRecord> = self
            .backend
            .select(
                &Select::from(Table::CartItems)
                    .eq("user_id", self.user_id)
                    .eq("product_id", product.id)
                    .order_by("created_at", true)
                    .limit(1),
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

fn line_id(key: LineKey) -> Result<CartLineId, StoreError> {
    match key {
        LineKey::Line(id) => Ok(id),
        LineKey::Product(_) => Err(StoreError::KeyMismatch {
            key,
            expected: "signed-in",
        }),
    }
}

impl<B: Backend> CartStore for RemoteCartStore<B> {
    fn is_authenticated(&self) -> bool {
        true
    }

    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn items(&self) -> Result<Vec<CartItem>, StoreError> {
        if let Some(items) = self.cache.get(self.user_id).await {
            return Ok(items.as_ref().clone());
        }

        debug!("Cart cache miss");
        let items = self.fetch().await?;
        Ok(self.cache.insert(self.user_id, items).await.as_ref().clone())
    }

    #[instrument(skip(self, product), fields(user_id = %self.user_id, product_id = %product.id))]
    async fn add_item(&self, product: &Product, quantity: Quantity) -> Result<(), StoreError> {
        match self.existing_line(product).await? {
            Some(line) => {
                let patch = QuantityPatch {
                    quantity: line.quantity.saturating_add(quantity),
                };
                self.backend
                    .update(Table::CartItems, &patch, &[Filter::eq("id", line.id)])
                    .await?;
            }
            None => {
                let row = NewCartLine {
                    user_id: self.user_id,
                    product_id: product.id,
                    quantity,
                };
                let _: Vec<CartLineRecord> = self.backend.insert(Table::CartItems, &[row]).await?;
            }
        }

        self.cache.invalidate(self.user_id).await;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn set_quantity(&self, key: LineKey, quantity: Quantity) -> Result<(), StoreError> {
        let id = line_id(key)?;
        self.backend
            .update(Table::CartItems, &QuantityPatch { quantity }, &[Filter::eq("id", id)])
            .await?;
        self.cache.invalidate(self.user_id).await;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn remove_item(&self, key: LineKey) -> Result<(), StoreError> {
        let id = line_id(key)?;
        self.backend
            .delete(Table::CartItems, &[Filter::eq("id", id)])
            .await?;
        self.cache.invalidate(self.user_id).await;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn clear(&self) -> Result<(), StoreError> {
        self.backend
            .delete(Table::CartItems, &[Filter::eq("user_id", self.user_id)])
            .await?;
        self.cache.invalidate(self.user_id).await;
        Ok(())
    }
}
