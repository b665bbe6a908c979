//! Signed-in cart flows: rows in `cart_items`, reads through the cart cache.

use sundry_core::{Price, UserId};
use sundry_integration_tests::{TestShop, qty};
use sundry_storefront::backend::{Operation, Table};
use sundry_storefront::cart::{CartAction, GUEST_CART_KEY, LineKey};
use sundry_storefront::notice::{Notice, NoticeLevel};

#[tokio::test]
async fn test_signed_in_add_and_subtotal() {
    let shop = TestShop::new();
    let user = UserId::generate();
    let p1 = shop.product("P1", 1000);
    let p2 = shop.product("P2", 500);
    let cart = shop.signed_in(user);

    cart.add_item(&p1, qty(1)).await.unwrap();
    cart.add_item(&p2, qty(3)).await.unwrap();
    cart.add_item(&p1, qty(1)).await.unwrap();

    let items = cart.items().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].quantity.get(), 2);
    assert_eq!(cart.subtotal().await.unwrap(), Price::from_cents(3500));
    assert_eq!(shop.backend.rows(Table::CartItems).len(), 2);
    assert!(cart.snapshot().await.unwrap().is_authenticated);
}

#[tokio::test]
async fn test_signed_in_cart_never_touches_guest_storage() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let cart = shop.signed_in(UserId::generate());

    cart.add_item(&p1, qty(1)).await.unwrap();

    assert!(shop.storage.raw(GUEST_CART_KEY).is_none());
}

#[tokio::test]
async fn test_negative_quantity_deletes_row() {
    let shop = TestShop::new();
    let user = UserId::generate();
    let p1 = shop.product("P1", 1000);
    let cart = shop.signed_in(user);
    cart.add_item(&p1, qty(4)).await.unwrap();
    let key = cart.items().await.unwrap()[0].key;

    cart.update_quantity(key, -1).await.unwrap();

    assert!(cart.items().await.unwrap().is_empty());
    assert!(shop.backend.rows(Table::CartItems).is_empty());
}

#[tokio::test]
async fn test_reads_are_cached_until_a_mutation() {
    let shop = TestShop::new();
    let user = UserId::generate();
    let p1 = shop.product("P1", 1000);
    let cart = shop.signed_in(user);
    cart.add_item(&p1, qty(1)).await.unwrap();

    cart.items().await.unwrap();
    cart.items().await.unwrap();
    let selects = shop.backend.call_count(Operation::Select, Table::CartItems);

    let key = cart.items().await.unwrap()[0].key;
    cart.update_quantity(key, 3).await.unwrap();
    let items = cart.items().await.unwrap();

    assert_eq!(items[0].quantity.get(), 3);
    assert_eq!(
        shop.backend.call_count(Operation::Select, Table::CartItems),
        selects + 1
    );
}

#[tokio::test]
async fn test_failed_update_reports_notice_and_keeps_state() {
    let shop = TestShop::new();
    let user = UserId::generate();
    let p1 = shop.product("P1", 1000);
    let cart = shop.signed_in(user);
    cart.add_item(&p1, qty(2)).await.unwrap();
    let key = cart.items().await.unwrap()[0].key;

    shop.backend.fail_on(Table::CartItems, Operation::Update);
    let err = cart.update_quantity(key, 5).await.unwrap_err();

    assert_eq!(err.action, CartAction::UpdateQuantity);
    assert_eq!(err.notice(), Notice::error("Failed to update quantity"));
    assert_eq!(err.notice().level, NoticeLevel::Error);
    assert_eq!(cart.items().await.unwrap()[0].quantity.get(), 2);
}

#[tokio::test]
async fn test_guest_key_is_rejected_by_signed_in_cart() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let cart = shop.signed_in(UserId::generate());
    cart.add_item(&p1, qty(1)).await.unwrap();

    let err = cart.remove_item(LineKey::Product(p1.id)).await.unwrap_err();

    assert!(err.is_client_error());
    assert_eq!(cart.items().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_users_see_only_their_own_rows() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let alice = shop.signed_in(UserId::generate());
    let bob = shop.signed_in(UserId::generate());

    alice.add_item(&p1, qty(1)).await.unwrap();

    assert_eq!(alice.items().await.unwrap().len(), 1);
    assert!(bob.items().await.unwrap().is_empty());
}
