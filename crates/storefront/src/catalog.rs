//! Product lookups, cached for 5 minutes.

use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use sundry_core::ProductId;

use crate::backend::{Backend, BackendError, Product, Select, Table};

/// Read-only access to the `products` table.
#[derive(Clone)]
pub struct ProductCatalog<B> {
    backend: B,
    cache: Cache<ProductId, Product>,
}

impl<B: Backend> ProductCatalog<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self { backend, cache }
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if no product has this ID.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, BackendError> {
        if let Some(product) = self.cache.get(&id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let rows: Vec<Product> = self
            .backend
            .select(&Select::from(Table::Products).eq("id", id).limit(1))
            .await?;
        let product = rows
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))?;

        self.cache.insert(id, product.clone()).await;
        Ok(product)
    }

    /// Drop a cached product.
    pub async fn invalidate(&self, id: ProductId) {
        self.cache.invalidate(&id).await;
    }
}
