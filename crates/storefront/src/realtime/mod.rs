//! Realtime table-change feeds.
//!
//! A [`ChangeFeed`] opens a [`Subscription`] for one table (optionally
//! narrowed by an equality filter) and delivers [`ChangeEvent`]s through a
//! bounded channel. Dropping or closing the subscription releases it.
//!
//! [`RealtimeClient`] speaks the backend's websocket protocol; the in-memory
//! backend implements the same trait for tests.

mod client;
mod protocol;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use sundry_core::UserId;

use crate::backend::{Filter, Table};

pub use client::RealtimeClient;

/// Capacity of the per-subscription event channel.
pub const EVENT_BUFFER: usize = 64;

/// Errors that can occur when subscribing to a change feed.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Websocket connection or transport failed.
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server refused the channel join.
    #[error("subscription rejected: {0}")]
    Rejected(String),

    /// The connection closed before the join was acknowledged.
    #[error("connection closed before the subscription was confirmed")]
    Closed,

    /// The join was not acknowledged in time.
    #[error("timed out waiting for the subscription to be confirmed")]
    Timeout,

    /// A frame could not be encoded or decoded.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configured backend URL cannot address the realtime endpoint.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which change kinds a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Only(ChangeKind),
}

impl EventFilter {
    /// Wire form: `*` or the change kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "*",
            Self::Only(kind) => kind.as_str(),
        }
    }

    #[must_use]
    pub fn accepts(self, kind: ChangeKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == kind,
        }
    }
}

/// A row change notification.
///
/// Consumers should treat events as signals, not as trusted row state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    /// New row (inserts and updates).
    pub record: Option<serde_json::Value>,
    /// Previous row (updates and deletes), as far as the server reports it.
    pub old_record: Option<serde_json::Value>,
}

/// What to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSubscription {
    /// Channel name, unique per connection.
    pub channel: String,
    pub schema: String,
    pub table: Table,
    pub event: EventFilter,
    pub filter: Option<Filter>,
}

impl ChangeSubscription {
    /// Every change to `user_id`'s `cart_items` rows.
    #[must_use]
    pub fn cart_items_for(user_id: UserId) -> Self {
        Self {
            channel: "cart-changes".to_string(),
            schema: "public".to_string(),
            table: Table::CartItems,
            event: EventFilter::All,
            filter: Some(Filter::eq("user_id", user_id)),
        }
    }

    /// Whether `event` falls within this subscription.
    #[must_use]
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.schema != self.schema
            || event.table != self.table.as_str()
            || !self.event.accepts(event.kind)
        {
            return false;
        }

        let Some(filter) = &self.filter else {
            return true;
        };

        event
            .record
            .as_ref()
            .or(event.old_record.as_ref())
            .and_then(|row| row.get(filter.column))
            .is_some_and(|value| match value {
                serde_json::Value::String(s) => *s == filter.value,
                other => other.to_string() == filter.value,
            })
    }
}

/// Sources of table-change notifications.
pub trait ChangeFeed: Clone + Send + Sync + 'static {
    /// Open a subscription. Resolves once the server has confirmed it.
    fn subscribe(
        &self,
        subscription: ChangeSubscription,
    ) -> impl Future<Output = Result<Subscription, RealtimeError>> + Send;
}

/// Handle to an open subscription.
///
/// The feed's background task stops (and leaves the channel) when the handle
/// is closed or dropped.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    close: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a feed task delivering into `events` and stopping on `close`.
    #[must_use]
    pub const fn new(
        events: mpsc::Receiver<ChangeEvent>,
        close: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            close: Some(close),
            task: Some(task),
        }
    }

    /// Next event, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Release the subscription and wait for the feed task to finish.
    pub async fn close(mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Change feed task ended abnormally");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(kind: ChangeKind, user: &str) -> ChangeEvent {
        ChangeEvent {
            kind,
            schema: "public".to_string(),
            table: "cart_items".to_string(),
            record: Some(serde_json::json!({ "user_id": user, "quantity": 2 })),
            old_record: None,
        }
    }

    #[test]
    fn test_cart_subscription_shape() {
        let user = UserId::generate();
        let sub = ChangeSubscription::cart_items_for(user);

        assert_eq!(sub.table, Table::CartItems);
        assert_eq!(sub.event.as_str(), "*");
        assert_eq!(
            sub.filter.unwrap().expression(),
            format!("user_id=eq.{user}")
        );
    }

    #[test]
    fn test_matches_only_own_rows() {
        let user = UserId::generate();
        let sub = ChangeSubscription::cart_items_for(user);

        assert!(sub.matches(&event(ChangeKind::Insert, &user.to_string())));
        assert!(!sub.matches(&event(ChangeKind::Insert, "someone-else")));
    }

    #[test]
    fn test_matches_delete_on_old_record() {
        let user = UserId::generate();
        let sub = ChangeSubscription::cart_items_for(user);

        let delete = ChangeEvent {
            kind: ChangeKind::Delete,
            schema: "public".to_string(),
            table: "cart_items".to_string(),
            record: None,
            old_record: Some(serde_json::json!({ "user_id": user.to_string() })),
        };
        assert!(sub.matches(&delete));
    }

    #[test]
    fn test_event_filter() {
        let sub = ChangeSubscription {
            event: EventFilter::Only(ChangeKind::Delete),
            ..ChangeSubscription::cart_items_for(UserId::generate())
        };
        assert!(!sub.event.accepts(ChangeKind::Insert));
        assert!(sub.event.accepts(ChangeKind::Delete));
    }

    #[test]
    fn test_other_table_does_not_match() {
        let user = UserId::generate();
        let sub = ChangeSubscription::cart_items_for(user);
        let mut other = event(ChangeKind::Update, &user.to_string());
        other.table = "orders".to_string();
        assert!(!sub.matches(&other));
    }

    #[tokio::test]
    async fn test_subscription_drop_signals_close() {
        let (_tx, rx) = mpsc::channel(1);
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = close_rx.await;
        });
        let handle = task.abort_handle();

        drop(Subscription::new(rx, close_tx, task));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(handle.is_finished());
    }
}
