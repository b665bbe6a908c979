//! Per-user cache of signed-in cart lines.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use sundry_core::UserId;

use super::CartItem;

/// Upper bound on cached carts.
const MAX_CARTS: u64 = 10_000;

/// Cached result of the cart-items query, keyed by user.
///
/// Entries are dropped on local mutations and on realtime change events, and
/// expire after the configured TTL regardless.
#[derive(Clone)]
pub struct CartCache {
    carts: Cache<UserId, Arc<Vec<CartItem>>>,
}

impl CartCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            carts: Cache::builder()
                .max_capacity(MAX_CARTS)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, user_id: UserId) -> Option<Arc<Vec<CartItem>>> {
        self.carts.get(&user_id).await
    }

    pub async fn insert(&self, user_id: UserId, items: Vec<CartItem>) -> Arc<Vec<CartItem>> {
        let items = Arc::new(items);
        self.carts.insert(user_id, Arc::clone(&items)).await;
        items
    }

    /// Mark `user_id`'s cart stale; the next read re-fetches.
    pub async fn invalidate(&self, user_id: UserId) {
        self.carts.invalidate(&user_id).await;
    }

    #[must_use]
    pub fn contains(&self, user_id: UserId) -> bool {
        self.carts.contains_key(&user_id)
    }
}

impl Default for CartCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300)) // 5 minutes
    }
}
