//! Realtime Sync Listener: keeps cached signed-in carts fresh.
//!
//! Every change event on a user's `cart_items` rows drops that user's
//! [`CartCache`] entry; the payload itself is ignored. One listener runs per
//! signed-in user, held by the [`SyncRegistry`] in application state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use sundry_core::UserId;

use crate::cart::CartCache;
use crate::realtime::{ChangeFeed, ChangeSubscription, RealtimeError};

/// A running listener. Dropping it stops the listener and releases the
/// subscription.
#[derive(Debug)]
pub struct SyncHandle {
    user_id: UserId,
    task: JoinHandle<()>,
}

impl SyncHandle {
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// False once the feed has ended (e.g. the socket dropped).
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts cart listeners.
pub struct CartSyncListener;

impl CartSyncListener {
    /// Subscribe to `user_id`'s cart rows on `feed` and invalidate `cache` on
    /// every change.
    ///
    /// The user's entry is also dropped once the subscription is confirmed,
    /// since changes made while nobody was listening were missed.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription cannot be opened.
    #[instrument(skip(feed, cache))]
    pub async fn start<F: ChangeFeed>(
        feed: &F,
        cache: CartCache,
        user_id: UserId,
    ) -> Result<SyncHandle, RealtimeError> {
        let mut subscription = feed
            .subscribe(ChangeSubscription::cart_items_for(user_id))
            .await?;
        cache.invalidate(user_id).await;

        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                debug!(%user_id, kind = %event.kind, "Cart changed; invalidating cache");
                cache.invalidate(user_id).await;
            }
            info!(%user_id, "Cart change feed ended");
        });

        Ok(SyncHandle { user_id, task })
    }
}

/// A user's listener slot. Its lock is held while a subscription opens, so
/// concurrent sign-ins for one user open a single socket.
type Slot = Arc<Mutex<Option<SyncHandle>>>;

/// Listeners by user.
///
/// Keyed by user rather than session: signing out in one session stops live
/// updates for that user's other sessions too (their reads still expire with
/// the cache TTL).
#[derive(Clone, Default)]
pub struct SyncRegistry {
    listeners: Arc<Mutex<HashMap<UserId, Slot>>>,
}

impl SyncRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a listener runs for `user_id`. A finished listener is replaced.
    ///
    /// # Errors
    ///
    /// Returns error if a new subscription cannot be opened.
    pub async fn attach<F: ChangeFeed>(
        &self,
        feed: &F,
        cache: &CartCache,
        user_id: UserId,
    ) -> Result<(), RealtimeError> {
        let slot = self.slot(user_id).await;
        let mut listener = slot.lock().await;
        if listener.as_ref().is_some_and(SyncHandle::is_active) {
            return Ok(());
        }

        *listener = Some(CartSyncListener::start(feed, cache.clone(), user_id).await?);
        Ok(())
    }

    /// Replace `user_id`'s listener with one subscribed through `feed`, e.g.
    /// after the user's access token was refreshed. The old listener keeps
    /// running if the new subscription fails.
    ///
    /// # Errors
    ///
    /// Returns error if the new subscription cannot be opened.
    pub async fn renew<F: ChangeFeed>(
        &self,
        feed: &F,
        cache: &CartCache,
        user_id: UserId,
    ) -> Result<(), RealtimeError> {
        let slot = self.slot(user_id).await;
        let mut listener = slot.lock().await;
        let handle = CartSyncListener::start(feed, cache.clone(), user_id).await?;
        *listener = Some(handle);
        Ok(())
    }

    /// Stop `user_id`'s listener. Returns whether one was running.
    pub async fn detach(&self, user_id: UserId) -> bool {
        let slot = self.listeners.lock().await.remove(&user_id);
        match slot {
            Some(slot) => slot.lock().await.take().is_some(),
            None => false,
        }
    }

    pub async fn is_attached(&self, user_id: UserId) -> bool {
        let slot = self.listeners.lock().await.get(&user_id).cloned();
        match slot {
            Some(slot) => slot.lock().await.as_ref().is_some_and(SyncHandle::is_active),
            None => false,
        }
    }

    async fn slot(&self, user_id: UserId) -> Slot {
        Arc::clone(self.listeners.lock().await.entry(user_id).or_default())
    }
}
