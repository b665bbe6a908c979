//! Guest cart handling when a visitor signs in.

use sundry_core::UserId;
use sundry_integration_tests::{TestShop, qty};
use sundry_storefront::backend::{Operation, Table};
use sundry_storefront::cart::{GUEST_CART_KEY, GuestCartPolicy, migrate_guest_cart};

#[tokio::test]
async fn test_sign_in_keeps_guest_cart_unmerged_by_default() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    shop.guest().add_item(&p1, qty(2)).await.unwrap();
    let stored = shop.storage.raw(GUEST_CART_KEY);
    let user = UserId::generate();

    let report = migrate_guest_cart(GuestCartPolicy::default(), &shop.storage, &shop.remote(user))
        .await
        .unwrap();

    assert_eq!(report.merged_lines, 0);
    assert_eq!(shop.storage.raw(GUEST_CART_KEY), stored);
    assert!(shop.signed_in(user).items().await.unwrap().is_empty());

    // Signing out again shows the guest cart as it was.
    assert_eq!(shop.guest().items().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_merge_adds_guest_lines_to_existing_rows() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let p2 = shop.product("P2", 200);
    let user = UserId::generate();
    shop.signed_in(user).add_item(&p1, qty(1)).await.unwrap();
    let guest = shop.guest();
    guest.add_item(&p1, qty(2)).await.unwrap();
    guest.add_item(&p2, qty(1)).await.unwrap();

    let report = migrate_guest_cart(GuestCartPolicy::Merge, &shop.storage, &shop.remote(user))
        .await
        .unwrap();

    let items = shop.signed_in(user).items().await.unwrap();
    assert_eq!(report.merged_lines, 2);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].product_id, p1.id);
    assert_eq!(items[0].quantity.get(), 3);
    assert!(shop.storage.raw(GUEST_CART_KEY).is_none());
}

#[tokio::test]
async fn test_merge_interrupted_then_retried_does_not_double_lines() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let p2 = shop.product("P2", 200);
    let user = UserId::generate();
    shop.signed_in(user).add_item(&p1, qty(1)).await.unwrap();
    let guest = shop.guest();
    guest.add_item(&p1, qty(2)).await.unwrap();
    guest.add_item(&p2, qty(1)).await.unwrap();

    shop.backend.fail_on(Table::CartItems, Operation::Insert);
    let first = migrate_guest_cart(GuestCartPolicy::Merge, &shop.storage, &shop.remote(user)).await;
    assert!(first.is_err());

    // Only the line that was not merged is left for the next sign-in.
    let left = shop.guest().items().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].product_id, p2.id);

    shop.backend.clear_failures();
    migrate_guest_cart(GuestCartPolicy::Merge, &shop.storage, &shop.remote(user))
        .await
        .unwrap();

    let items = shop.signed_in(user).items().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].product_id, p1.id);
    assert_eq!(items[0].quantity.get(), 3);
    assert_eq!(items[1].product_id, p2.id);
    assert_eq!(items[1].quantity.get(), 1);
    assert!(shop.storage.raw(GUEST_CART_KEY).is_none());
}

#[tokio::test]
async fn test_empty_guest_cart_is_a_no_op_for_every_policy() {
    let shop = TestShop::new();
    let user = UserId::generate();

    for policy in [GuestCartPolicy::Keep, GuestCartPolicy::Merge, GuestCartPolicy::Discard] {
        let report = migrate_guest_cart(policy, &shop.storage, &shop.remote(user))
            .await
            .unwrap();
        assert_eq!(report.merged_lines + report.discarded_lines, 0);
    }
    assert!(shop.backend.calls().is_empty());
}
