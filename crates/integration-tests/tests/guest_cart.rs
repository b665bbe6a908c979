//! Guest cart flows: everything lives in visitor storage.

use sundry_core::Price;
use sundry_integration_tests::{TestShop, qty};
use sundry_storefront::backend::{Operation, Table};
use sundry_storefront::cart::{GUEST_CART_KEY, LineKey, LocalCartStore};
use sundry_storefront::notice::Notice;

#[tokio::test]
async fn test_empty_guest_cart_add_one_product() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let cart = shop.guest();

    assert!(cart.items().await.unwrap().is_empty());

    let notice = cart.add_item(&p1, qty(1)).await.unwrap();

    assert_eq!(notice, Notice::success("Added to cart!"));
    assert_eq!(cart.subtotal().await.unwrap(), Price::from_cents(1000));
    assert!(shop.backend.calls().is_empty());
}

#[tokio::test]
async fn test_zero_quantity_removes_guest_line() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let p2 = shop.product("P2", 300);
    let cart = shop.guest();
    cart.add_item(&p1, qty(2)).await.unwrap();
    cart.add_item(&p2, qty(1)).await.unwrap();
    let before = cart.items().await.unwrap().len();

    let notice = cart
        .update_quantity(LineKey::Product(p1.id), 0)
        .await
        .unwrap();

    let items = cart.items().await.unwrap();
    assert_eq!(notice, Some(Notice::success("Item removed from cart")));
    assert_eq!(items.len(), before - 1);
    assert!(items.iter().all(|item| item.product_id != p1.id));
}

#[tokio::test]
async fn test_storage_mirrors_every_mutation() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let p2 = shop.product("P2", 250);
    let cart = shop.guest();
    let store = LocalCartStore::new(shop.storage.clone());

    cart.add_item(&p1, qty(1)).await.unwrap();
    cart.add_item(&p2, qty(2)).await.unwrap();
    cart.add_item(&p1, qty(1)).await.unwrap();
    cart.update_quantity(LineKey::Product(p2.id), 5).await.unwrap();

    let stored = store.load().await.unwrap();
    let items = cart.items().await.unwrap();
    assert_eq!(stored.len(), items.len());
    for (line, item) in stored.iter().zip(&items) {
        assert_eq!(line.product_id, item.product_id);
        assert_eq!(line.quantity, item.quantity);
    }
    assert_eq!(stored[0].quantity.get(), 2);
    assert_eq!(stored[1].quantity.get(), 5);

    cart.remove_item(LineKey::Product(p1.id)).await.unwrap();
    cart.remove_item(LineKey::Product(p2.id)).await.unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&shop.storage.raw(GUEST_CART_KEY).unwrap()).unwrap();
    assert_eq!(raw, serde_json::json!([]));
}

#[tokio::test]
async fn test_guest_subtotal_uses_stored_product_prices() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1999);
    let p2 = shop.product("P2", 1);
    let cart = shop.guest();

    cart.add_item(&p1, qty(3)).await.unwrap();
    cart.add_item(&p2, qty(7)).await.unwrap();

    assert_eq!(cart.subtotal().await.unwrap(), Price::from_cents(3 * 1999 + 7));
    let snapshot = cart.snapshot().await.unwrap();
    assert_eq!(snapshot.item_count, 10);
    assert!(!snapshot.is_authenticated);
}

#[tokio::test]
async fn test_corrupt_guest_storage_reads_as_empty() {
    let shop = TestShop::new();
    shop.storage.put_raw(GUEST_CART_KEY, "{not json");
    let cart = shop.guest();

    assert!(cart.items().await.unwrap().is_empty());
    assert!(shop.storage.raw(GUEST_CART_KEY).is_none());

    let p1 = shop.product("P1", 500);
    cart.add_item(&p1, qty(1)).await.unwrap();
    assert_eq!(cart.items().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_guest_cart_ignores_backend_failures() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 500);
    shop.backend.fail_on(Table::CartItems, Operation::Insert);
    shop.backend.fail_on(Table::CartItems, Operation::Select);

    let cart = shop.guest();
    cart.add_item(&p1, qty(1)).await.unwrap();

    assert_eq!(cart.items().await.unwrap().len(), 1);
}
