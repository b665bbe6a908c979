//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::{AuthClient, AuthError, BackendError, RestBackend};
use crate::cart::CartCache;
use crate::catalog::ProductCatalog;
use crate::config::StorefrontConfig;
use crate::realtime::{RealtimeClient, RealtimeError};
use crate::sync::SyncRegistry;

/// Error creating the backend clients.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("auth client: {0}")]
    Auth(#[from] AuthError),
    #[error("realtime client: {0}")]
    Realtime(#[from] RealtimeError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the backend clients, caches and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: RestBackend,
    auth: AuthClient,
    realtime: RealtimeClient,
    catalog: ProductCatalog<RestBackend>,
    cart_cache: CartCache,
    sync: SyncRegistry,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend URL cannot address one of the
    /// backend's endpoints.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let backend = RestBackend::new(&config.backend)?;
        let auth = AuthClient::new(&config.backend)?;
        let realtime = RealtimeClient::new(&config.backend, config.cart.realtime_heartbeat)?;
        let catalog = ProductCatalog::new(backend.clone());
        let cart_cache = CartCache::new(config.cart.cache_ttl);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                auth,
                realtime,
                catalog,
                cart_cache,
                sync: SyncRegistry::new(),
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Backend query client using the anon key.
    #[must_use]
    pub fn backend(&self) -> &RestBackend {
        &self.inner.backend
    }

    /// Get a reference to the auth client.
    #[must_use]
    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    /// Realtime client using the anon key.
    #[must_use]
    pub fn realtime(&self) -> &RealtimeClient {
        &self.inner.realtime
    }

    #[must_use]
    pub fn catalog(&self) -> &ProductCatalog<RestBackend> {
        &self.inner.catalog
    }

    /// Signed-in cart cache, shared with the sync listeners.
    #[must_use]
    pub fn cart_cache(&self) -> &CartCache {
        &self.inner.cart_cache
    }

    #[must_use]
    pub fn sync(&self) -> &SyncRegistry {
        &self.inner.sync
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use secrecy::SecretString;
    use url::Url;

    use super::AppState;
    use crate::config::{BackendConfig, CartConfig, StorefrontConfig};

    /// Configuration for a backend at `url`.
    pub fn config_for(url: &str) -> StorefrontConfig {
        StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            backend: BackendConfig {
                url: Url::parse(url).unwrap(),
                anon_key: SecretString::from("anon-key"),
            },
            cart: CartConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// State for a backend at `url`. Nothing is contacted until used.
    pub fn state_for(url: &str) -> AppState {
        AppState::new(config_for(url)).unwrap()
    }
}
