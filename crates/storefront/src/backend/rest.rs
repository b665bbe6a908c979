//! PostgREST-dialect table client.
//!
//! Uses `reqwest` 0.13 for HTTP. Every request carries the project's anon key
//! as `apikey`; the bearer token is the signed-in user's access token when one
//! is attached, so row-level security scopes the rows to that user.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::query::{Filter, Select, Table};
use super::{Backend, BackendError};
use crate::config::BackendConfig;

/// Longest slice of a response body kept in logs and error messages.
const BODY_EXCERPT_CHARS: usize = 200;

// =============================================================================
// RestBackend
// =============================================================================

/// Client for the backend's REST table interface.
///
/// Cloning is cheap; [`RestBackend::with_access_token`] returns a clone that
/// acts on behalf of a signed-in user.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<RestBackendInner>,
    access_token: Option<SecretString>,
}

struct RestBackendInner {
    client: reqwest::Client,
    rest_url: Url,
    anon_key: SecretString,
}

impl RestBackend {
    /// Create a client for the project at `config.url`.
    ///
    /// # Errors
    ///
    /// Returns error if the REST endpoint cannot be derived from the URL.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            inner: Arc::new(RestBackendInner {
                client: reqwest::Client::new(),
                rest_url: config.url.join("rest/v1/")?,
                anon_key: config.anon_key.clone(),
            }),
            access_token: None,
        })
    }

    /// A client sending `token` as the bearer instead of the anon key.
    #[must_use]
    pub fn with_access_token(&self, token: &SecretString) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            access_token: Some(token.clone()),
        }
    }

    fn table_url(&self, table: Table) -> Result<Url, BackendError> {
        Ok(self.inner.rest_url.join(table.as_str())?)
    }

    fn filtered_url(&self, table: Table, filters: &[Filter]) -> Result<Url, BackendError> {
        let mut url = self.table_url(table)?;
        {
            let mut pairs = url.query_pairs_mut();
            for filter in filters {
                pairs.append_pair(filter.column, &filter.operand());
            }
        }
        Ok(url)
    }

    fn select_url(&self, query: &Select) -> Result<Url, BackendError> {
        let mut url = self.table_url(query.table)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", &query.columns());
            for filter in &query.filters {
                pairs.append_pair(filter.column, &filter.operand());
            }
            if let Some(order) = query.order {
                let direction = if order.ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{direction}", order.column));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self
            .access_token
            .as_ref()
            .unwrap_or(&self.inner.anon_key)
            .expose_secret();

        self.inner
            .client
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .header(AUTHORIZATION, format!("Bearer {bearer}"))
    }

    /// Send a request and return the body of a successful response.
    async fn execute(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            let message = api_error_message(&body);
            tracing::error!(
                status = %status,
                message = %message,
                "Backend returned non-success status"
            );
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }

    async fn execute_rows<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Vec<T>, BackendError> {
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse backend rows"
            );
            BackendError::Parse(e)
        })
    }
}

impl Backend for RestBackend {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select<T>(&self, query: &Select) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned + Send,
    {
        let url = self.select_url(query)?;
        debug!(%url, "Selecting rows");
        self.execute_rows(self.request(Method::GET, url)).await
    }

    #[instrument(skip(self, rows), fields(table = %table, rows = rows.len()))]
    async fn insert<R, T>(&self, table: Table, rows: &[R]) -> Result<Vec<T>, BackendError>
    where
        R: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let request = self
            .request(Method::POST, self.table_url(table)?)
            .header("Prefer", "return=representation")
            .json(rows);
        self.execute_rows(request).await
    }

    #[instrument(skip(self, patch, filters), fields(table = %table))]
    async fn update<P>(&self, table: Table, patch: &P, filters: &[Filter]) -> Result<(), BackendError>
    where
        P: Serialize + Sync,
    {
        let request = self
            .request(Method::PATCH, self.filtered_url(table, filters)?)
            .header("Prefer", "return=minimal")
            .json(patch);
        self.execute(request).await.map(drop)
    }

    #[instrument(skip(self, filters), fields(table = %table))]
    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<(), BackendError> {
        let request = self
            .request(Method::DELETE, self.filtered_url(table, filters)?)
            .header("Prefer", "return=minimal");
        self.execute(request).await.map(drop)
    }

    #[instrument(skip(self, rows), fields(table = %table, rows = rows.len()))]
    async fn upsert<R, T>(
        &self,
        table: Table,
        rows: &[R],
        on_conflict: &[&str],
    ) -> Result<Vec<T>, BackendError>
    where
        R: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let mut url = self.table_url(table)?;
        if !on_conflict.is_empty() {
            url.query_pairs_mut()
                .append_pair("on_conflict", &on_conflict.join(","));
        }

        let request = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(rows);
        self.execute_rows(request).await
    }
}

/// Extract the human-readable message from a PostgREST error body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| excerpt(body))
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
