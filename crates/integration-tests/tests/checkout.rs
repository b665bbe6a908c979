//! Checkout flows against the in-memory backend.

use sundry_core::{OrderStatus, Price, UserId};
use sundry_integration_tests::{TestShop, qty};
use sundry_storefront::backend::{Operation, OrderLine, Table};
use sundry_storefront::checkout::{CheckoutOutcome, CheckoutService, CheckoutStage};
use sundry_storefront::notice::Notice;

async fn two_line_cart(shop: &TestShop, user: UserId) -> Vec<sundry_storefront::cart::CartItem> {
    let p1 = shop.product("P1", 1000);
    let p2 = shop.product("P2", 500);
    let cart = shop.signed_in(user);
    cart.add_item(&p1, qty(1)).await.unwrap();
    cart.add_item(&p2, qty(3)).await.unwrap();
    cart.items().await.unwrap()
}

#[tokio::test]
async fn test_checkout_places_order_and_clears_cart() {
    let shop = TestShop::new();
    let user = UserId::generate();
    let items = two_line_cart(&shop, user).await;
    let service = CheckoutService::new(shop.backend.clone(), shop.cache.clone());

    let outcome = service.checkout(Some(user), &items).await.unwrap();

    let CheckoutOutcome::Placed { order, notice, .. } = outcome else {
        panic!("expected a placed order");
    };
    assert_eq!(order.total_amount, Price::from_cents(2500));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(notice, Notice::success("Order placed successfully!"));

    let lines: Vec<OrderLine> = shop.backend.rows_as(Table::OrderItems).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line.order_id == order.id));
    assert!(shop.backend.rows(Table::CartItems).is_empty());
    assert!(shop.signed_in(user).items().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_order_lines_keep_cart_rows() {
    let shop = TestShop::new();
    let user = UserId::generate();
    let items = two_line_cart(&shop, user).await;
    let service = CheckoutService::new(shop.backend.clone(), shop.cache.clone());
    shop.backend.fail_on(Table::OrderItems, Operation::Insert);

    let err = service.checkout(Some(user), &items).await.unwrap_err();

    assert_eq!(err.stage, CheckoutStage::CreateOrderLines);
    assert_eq!(err.notice(), Notice::error("Failed to place order"));
    assert_eq!(shop.backend.rows(Table::Orders).len(), 1);
    assert_eq!(shop.backend.rows(Table::CartItems).len(), 2);
    assert_eq!(shop.signed_in(user).items().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_guest_checkout_redirects_to_sign_in() {
    let shop = TestShop::new();
    let p1 = shop.product("P1", 1000);
    let guest = shop.guest();
    guest.add_item(&p1, qty(1)).await.unwrap();
    let items = guest.items().await.unwrap();
    let service = CheckoutService::new(shop.backend.clone(), shop.cache.clone());

    let outcome = service.checkout(None, &items).await.unwrap();

    assert!(matches!(
        outcome,
        CheckoutOutcome::SignInRequired { redirect: "/auth", .. }
    ));
    assert!(shop.backend.rows(Table::Orders).is_empty());
    assert_eq!(guest.items().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_order_lines_record_price_at_checkout() {
    let shop = TestShop::new();
    let user = UserId::generate();
    let items = two_line_cart(&shop, user).await;
    let service = CheckoutService::new(shop.backend.clone(), shop.cache.clone());

    service.checkout(Some(user), &items).await.unwrap();

    let lines: Vec<OrderLine> = shop.backend.rows_as(Table::OrderItems).unwrap();
    let mut prices: Vec<Price> = lines.iter().map(|line| line.price_at_time).collect();
    prices.sort();
    assert_eq!(prices, vec![Price::from_cents(500), Price::from_cents(1000)]);
}
