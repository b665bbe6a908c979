//! Hosted backend clients.
//!
//! # Architecture
//!
//! - The backend is the source of truth: no local database, direct API calls
//! - Tables are reached through a PostgREST-style HTTP interface
//!   ([`RestBackend`]); authentication through [`AuthClient`]
//! - Realtime change feeds live in [`crate::realtime`]
//!
//! # Example
//!
//! ```rust,ignore
//! use sundry_storefront::backend::{Backend, RestBackend, Select, Table};
//!
//! let backend = RestBackend::new(&config.backend)?.with_access_token(&token);
//! let rows: Vec<CartLineWithProduct> = backend
//!     .select(
//!         &Select::from(Table::CartItems)
//!             .embed("product", Table::Products, "product_id")
//!             .eq("user_id", user_id)
//!             .order_by("created_at", true),
//!     )
//!     .await?;
//! ```

mod auth;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod query;
mod rest;
pub mod types;

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use auth::{AuthClient, AuthError, AuthSession, AuthUser, SignUpOutcome};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryBackend, Operation};
pub use query::{Embed, Filter, Select, SortOrder, Table};
pub use rest::RestBackend;
pub use types::*;

/// Errors that can occur when talking to the backend's table interface.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configured backend URL cannot address the requested resource.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Table operations offered by the hosted backend.
///
/// Filters are conjunctions of column equalities. Implementations are cheap
/// to clone and shared across requests.
pub trait Backend: Clone + Send + Sync + 'static {
    /// Rows of `query.table` matching every filter, with embeds resolved.
    fn select<T>(
        &self,
        query: &Select,
    ) -> impl Future<Output = Result<Vec<T>, BackendError>> + Send
    where
        T: DeserializeOwned + Send;

    /// Insert `rows` and return them as stored (ids and defaults filled in).
    fn insert<R, T>(
        &self,
        table: Table,
        rows: &[R],
    ) -> impl Future<Output = Result<Vec<T>, BackendError>> + Send
    where
        R: Serialize + Sync,
        T: DeserializeOwned + Send;

    /// Apply `patch` to every row matching `filters`.
    fn update<P>(
        &self,
        table: Table,
        patch: &P,
        filters: &[Filter],
    ) -> impl Future<Output = Result<(), BackendError>> + Send
    where
        P: Serialize + Sync;

    /// Delete every row matching `filters`.
    fn delete(
        &self,
        table: Table,
        filters: &[Filter],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Insert `rows`, merging into existing rows that collide on `on_conflict`.
    fn upsert<R, T>(
        &self,
        table: Table,
        rows: &[R],
        on_conflict: &[&str],
    ) -> impl Future<Output = Result<Vec<T>, BackendError>> + Send
    where
        R: Serialize + Sync,
        T: DeserializeOwned + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::NotFound("product 42".to_string());
        assert_eq!(err.to_string(), "Not found: product 42");

        let err = BackendError::Api {
            status: 409,
            message: "duplicate key value violates unique constraint".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error: 409 - duplicate key value violates unique constraint"
        );
    }
}
