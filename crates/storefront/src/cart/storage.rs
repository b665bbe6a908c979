//! Per-visitor key/value storage backing the guest cart.

use std::future::Future;
#[cfg(any(test, feature = "test-util"))]
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tower_sessions::Session;

/// Errors that can occur when reading or writing visitor storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The session store failed.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// A value could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// String values by key, scoped to one visitor and surviving across requests.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl KeyValueStore for Session {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(Session::get::<String>(self, key).await?)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        Ok(self.insert(key, value).await?)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        Session::remove::<String>(self, key).await?;
        Ok(())
    }
}

/// Process-local storage for tests.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current raw value under `key`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Overwrite `key` directly.
    pub fn put_raw(&self, key: &str, value: impl Into<String>) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
    }
}

#[cfg(any(test, feature = "test-util"))]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.put_raw(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use tower_sessions::MemoryStore;

    #[tokio::test]
    async fn test_session_round_trips_strings() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        assert_eq!(KeyValueStore::get(&session, "guestCart").await.unwrap(), None);

        KeyValueStore::set(&session, "guestCart", "[]".to_string())
            .await
            .unwrap();
        assert_eq!(
            KeyValueStore::get(&session, "guestCart").await.unwrap(),
            Some("[]".to_string())
        );

        KeyValueStore::remove(&session, "guestCart").await.unwrap();
        assert_eq!(KeyValueStore::get(&session, "guestCart").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.set("k", "v".to_string()).await.unwrap();
        assert_eq!(storage.raw("k").as_deref(), Some("v"));
        storage.remove("k").await.unwrap();
        assert!(storage.get("k").await.unwrap().is_none());
    }
}
