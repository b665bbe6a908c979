//! What happens to a guest cart when the visitor signs in.

use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use super::local::LocalCartStore;
use super::remote::RemoteCartStore;
use super::storage::KeyValueStore;
use super::{CartStore, StoreError};
use crate::backend::Backend;

/// Handling of a non-empty guest cart at sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestCartPolicy {
    /// Leave the guest cart in storage, unmerged. It reappears on sign-out.
    #[default]
    Keep,
    /// Add every guest line to the signed-in cart, then clear the guest cart.
    Merge,
    /// Clear the guest cart.
    Discard,
}

/// Error parsing a [`GuestCartPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid guest cart policy '{0}' (expected keep, merge or discard)")]
pub struct ParsePolicyError(pub String);

impl FromStr for GuestCartPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "merge" => Ok(Self::Merge),
            "discard" => Ok(Self::Discard),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// Outcome of [`migrate_guest_cart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MigrationReport {
    pub policy: GuestCartPolicy,
    /// Guest lines added to the signed-in cart.
    pub merged_lines: usize,
    /// Guest lines dropped.
    pub discarded_lines: usize,
}

/// Apply `policy` to the guest cart in `storage` for the user behind `remote`.
///
/// A merge stops at the first failed line. Each merged line is dropped from
/// the guest cart as soon as it is added, so the stored guest cart only holds
/// the lines still to merge and a later sign-in does not add any line twice.
///
/// # Errors
///
/// Returns error if storage or the backend fails.
#[instrument(skip(storage, remote), fields(user_id = %remote.user_id()))]
pub async fn migrate_guest_cart<S, B>(
    policy: GuestCartPolicy,
    storage: &S,
    remote: &RemoteCartStore<B>,
) -> Result<MigrationReport, StoreError>
where
    S: KeyValueStore,
    B: Backend,
{
    let mut report = MigrationReport {
        policy,
        ..MigrationReport::default()
    };

    if policy == GuestCartPolicy::Keep {
        return Ok(report);
    }

    let guest = LocalCartStore::new(storage.clone());
    let lines = guest.load().await?;
    if lines.is_empty() {
        return Ok(report);
    }

    if policy == GuestCartPolicy::Merge {
        for (merged, line) in lines.iter().enumerate() {
            remote.add_item(&line.product, line.quantity).await?;
            report.merged_lines += 1;
            guest.save(&lines[merged + 1..]).await?;
        }
    } else {
        report.discarded_lines = lines.len();
    }

    guest.clear().await?;
    info!(
        merged = report.merged_lines,
        discarded = report.discarded_lines,
        "Guest cart migrated"
    );
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Operation, Table};
    use crate::cart::GUEST_CART_KEY;
    use crate::cart::cache::CartCache;
    use crate::cart::storage::MemoryStorage;
    use crate::cart::test_support::{product, qty};
    use sundry_core::UserId;

    async fn setup() -> (MemoryStorage, MemoryBackend, RemoteCartStore<MemoryBackend>) {
        let storage = MemoryStorage::new();
        let backend = MemoryBackend::new();
        let guest = LocalCartStore::new(storage.clone());

        let a = product("A", 1000);
        let b = product("B", 250);
        backend.seed(Table::Products, &[&a, &b]).unwrap();
        guest.add_item(&a, qty(2)).await.unwrap();
        guest.add_item(&b, qty(1)).await.unwrap();

        let remote = RemoteCartStore::new(backend.clone(), UserId::generate(), CartCache::default());
        (storage, backend, remote)
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("keep".parse(), Ok(GuestCartPolicy::Keep));
        assert_eq!(" Merge ".parse(), Ok(GuestCartPolicy::Merge));
        assert_eq!("DISCARD".parse(), Ok(GuestCartPolicy::Discard));
        assert!("sync".parse::<GuestCartPolicy>().is_err());
        assert_eq!(GuestCartPolicy::default(), GuestCartPolicy::Keep);
    }

    #[tokio::test]
    async fn test_keep_leaves_guest_cart_untouched() {
        let (storage, backend, remote) = setup().await;
        let before = storage.raw(GUEST_CART_KEY);

        let report = migrate_guest_cart(GuestCartPolicy::Keep, &storage, &remote)
            .await
            .unwrap();

        assert_eq!(report.merged_lines, 0);
        assert_eq!(storage.raw(GUEST_CART_KEY), before);
        assert!(backend.rows(Table::CartItems).is_empty());
    }

    #[tokio::test]
    async fn test_merge_moves_lines_and_clears_guest_cart() {
        let (storage, _backend, remote) = setup().await;

        let report = migrate_guest_cart(GuestCartPolicy::Merge, &storage, &remote)
            .await
            .unwrap();

        assert_eq!(report.merged_lines, 2);
        assert!(storage.raw(GUEST_CART_KEY).is_none());
        let items = remote.items().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity.get(), 2);
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_guest_cart() {
        let (storage, backend, remote) = setup().await;
        backend.fail_on(Table::CartItems, Operation::Insert);

        let result = migrate_guest_cart(GuestCartPolicy::Merge, &storage, &remote).await;

        assert!(result.is_err());
        assert!(storage.raw(GUEST_CART_KEY).is_some());
    }

    #[tokio::test]
    async fn test_retried_merge_adds_each_guest_line_once() {
        let (storage, backend, remote) = setup().await;
        let guest_lines = LocalCartStore::new(storage.clone()).load().await.unwrap();
        let (a, b) = (&guest_lines[0].product, &guest_lines[1].product);
        remote.add_item(a, qty(1)).await.unwrap();

        // A is merged by updating its existing row; B needs an insert.
        backend.fail_on(Table::CartItems, Operation::Insert);
        let result = migrate_guest_cart(GuestCartPolicy::Merge, &storage, &remote).await;
        assert!(result.is_err());

        let left = LocalCartStore::new(storage.clone()).load().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].product_id, b.id);

        backend.clear_failures();
        let report = migrate_guest_cart(GuestCartPolicy::Merge, &storage, &remote)
            .await
            .unwrap();
        assert_eq!(report.merged_lines, 1);
        assert!(storage.raw(GUEST_CART_KEY).is_none());

        let items = remote.items().await.unwrap();
        let quantity_of = |id| {
            items
                .iter()
                .find(|item| item.product_id == id)
                .map(|item| item.quantity.get())
        };
        assert_eq!(quantity_of(a.id), Some(3));
        assert_eq!(quantity_of(b.id), Some(1));
    }

    #[tokio::test]
    async fn test_discard_clears_guest_cart() {
        let (storage, backend, remote) = setup().await;

        let report = migrate_guest_cart(GuestCartPolicy::Discard, &storage, &remote)
            .await
            .unwrap();

        assert_eq!(report.discarded_lines, 2);
        assert!(storage.raw(GUEST_CART_KEY).is_none());
        assert!(backend.rows(Table::CartItems).is_empty());
    }
}
