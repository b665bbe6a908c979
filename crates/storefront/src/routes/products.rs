//! Product route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use sundry_core::{Price, ProductId};

use crate::backend::Product;
use crate::error::Result;
use crate::state::AppState;

/// A product plus its struck-through price when on sale.
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_price: Option<Price>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            list_price: product.list_price(),
            product,
        }
    }
}

/// Product by ID, served from the catalog cache when fresh.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductResponse>> {
    Ok(Json(state.catalog().get_product(id).await?.into()))
}
