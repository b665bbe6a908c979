//! Checkout Orchestrator.
//!
//! Turns a signed-in cart into an order in three sequential steps: insert the
//! `orders` row, insert its `order_items`, delete the user's `cart_items`.
//! Each step runs only if the previous one succeeded. There is no rollback: a
//! failure after the first step leaves the order behind, and the error says
//! which step failed.

use std::fmt;

use thiserror::Error;
use tracing::{error, info, instrument};

use sundry_core::{OrderId, OrderStatus, UserId};

use crate::backend::{Backend, BackendError, NewOrder, NewOrderLine, Order, OrderLine, Table};
use crate::cart::{CartCache, CartItem, CartStore, RemoteCartStore, StoreError, subtotal};
use crate::notice::Notice;

/// Where guests are sent to sign in before checking out.
pub const SIGN_IN_PATH: &str = "/auth";

/// Checkout step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    CreateOrder,
    CreateOrderLines,
    ClearCart,
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateOrder => "create order",
            Self::CreateOrderLines => "create order lines",
            Self::ClearCart => "clear cart",
        })
    }
}

/// A checkout that stopped at `stage`.
#[derive(Debug, Error)]
#[error("checkout failed at {stage}: {source}")]
pub struct CheckoutError {
    pub stage: CheckoutStage,
    /// The order created before the failure, if any. It is not cleaned up.
    pub order_id: Option<OrderId>,
    #[source]
    pub source: StoreError,
}

impl CheckoutError {
    #[must_use]
    pub fn notice(&self) -> Notice {
        Notice::error("Failed to place order")
    }
}

/// Result of a checkout attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The order and its lines were written and the cart cleared.
    Placed {
        order: Order,
        lines: Vec<OrderLine>,
        notice: Notice,
    },
    /// Nothing to order; no backend calls were made.
    EmptyCart,
    /// Guests must sign in first.
    SignInRequired {
        redirect: &'static str,
        notice: Notice,
    },
}

/// Places orders for signed-in carts.
#[derive(Clone)]
pub struct CheckoutService<B> {
    backend: B,
    cache: CartCache,
}

impl<B: Backend> CheckoutService<B> {
    pub const fn new(backend: B, cache: CartCache) -> Self {
        Self { backend, cache }
    }

    /// Check out `items` for `user`.
    ///
    /// Line prices are snapshotted from the embedded products; the order
    /// total is their subtotal.
    ///
    /// # Errors
    ///
    /// Returns error naming the failed step if a backend call fails.
    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn checkout(
        &self,
        user: Option<UserId>,
        items: &[CartItem],
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let Some(user_id) = user else {
            return Ok(CheckoutOutcome::SignInRequired {
                redirect: SIGN_IN_PATH,
                notice: Notice::info("Please sign in to checkout"),
            });
        };

        if items.is_empty() {
            return Ok(CheckoutOutcome::EmptyCart);
        }

        let order = self
            .create_order(user_id, items)
            .await
            .map_err(|e| failed(CheckoutStage::CreateOrder, None, e.into()))?;

        let lines = self
            .create_order_lines(&order, items)
            .await
            .map_err(|e| failed(CheckoutStage::CreateOrderLines, Some(order.id), e.into()))?;

        RemoteCartStore::new(self.backend.clone(), user_id, self.cache.clone())
            .clear()
            .await
            .map_err(|e| failed(CheckoutStage::ClearCart, Some(order.id), e))?;

        info!(order_id = %order.id, total = %order.total_amount, "Order placed");

        Ok(CheckoutOutcome::Placed {
            order,
            lines,
            notice: Notice::success("Order placed successfully!"),
        })
    }

    async fn create_order(&self, user_id: UserId, items: &[CartItem]) -> Result<Order, BackendError> {
        let new_order = NewOrder {
            user_id,
            total_amount: subtotal(items),
            status: OrderStatus::Pending,
        };

        let rows: Vec<Order> = self.backend.insert(Table::Orders, &[new_order]).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("inserted order row".to_string()))
    }

    async fn create_order_lines(
        &self,
        order: &Order,
        items: &[CartItem],
    ) -> Result<Vec<OrderLine>, BackendError> {
        let rows: Vec<NewOrderLine> = items
            .iter()
            .map(|item| NewOrderLine {
                order_id: order.id,
                product_id: item.product_id,
                quantity: item.quantity,
                price_at_time: item.product.price,
            })
            .collect();

        self.backend.insert(Table::OrderItems, &rows).await
    }
}

fn failed(stage: CheckoutStage, order_id: Option<OrderId>, source: StoreError) -> CheckoutError {
    match order_id {
        Some(order_id) => error!(%stage, %order_id, error = %source, "Checkout failed; order left incomplete"),
        None => error!(%stage, error = %source, "Checkout failed"),
    }
    CheckoutError {
        stage,
        order_id,
        source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Operation};
    use crate::cart::test_support::{product, qty};
    use crate::notice::NoticeLevel;
    use sundry_core::Price;

    async fn cart_with_items(
        backend: &MemoryBackend,
        cache: &CartCache,
        user: UserId,
    ) -> Vec<CartItem> {
        let a = product("A", 1000);
        let b = product("B", 550);
        backend.seed(Table::Products, &[&a, &b]).unwrap();

        let store = RemoteCartStore::new(backend.clone(), user, cache.clone());
        store.add_item(&a, qty(2)).await.unwrap();
        store.add_item(&b, qty(1)).await.unwrap();
        store.items().await.unwrap()
    }

    #[tokio::test]
    async fn test_guest_is_sent_to_sign_in() {
        let backend = MemoryBackend::new();
        let service = CheckoutService::new(backend.clone(), CartCache::default());

        let outcome = service.checkout(None, &[]).await.unwrap();

        assert_eq!(
            outcome,
            CheckoutOutcome::SignInRequired {
                redirect: "/auth",
                notice: Notice::info("Please sign in to checkout"),
            }
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_cart_is_a_no_op() {
        let backend = MemoryBackend::new();
        let service = CheckoutService::new(backend.clone(), CartCache::default());

        let outcome = service
            .checkout(Some(UserId::generate()), &[])
            .await
            .unwrap();

        assert_eq!(outcome, CheckoutOutcome::EmptyCart);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_places_order_and_clears_cart() {
        let backend = MemoryBackend::new();
        let cache = CartCache::default();
        let user = UserId::generate();
        let items = cart_with_items(&backend, &cache, user).await;
        let service = CheckoutService::new(backend.clone(), cache.clone());

        let outcome = service.checkout(Some(user), &items).await.unwrap();

        let CheckoutOutcome::Placed { order, lines, notice } = outcome else {
            panic!("expected a placed order");
        };
        assert_eq!(order.user_id, user);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Price::from_cents(2550));
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.order_id == order.id));
        assert_eq!(lines[0].price_at_time, Price::from_cents(1000));
        assert_eq!(notice.message, "Order placed successfully!");
        assert!(backend.rows(Table::CartItems).is_empty());
        assert!(!cache.contains(user));
    }

    #[tokio::test]
    async fn test_failed_order_lines_leave_orphaned_order() {
        let backend = MemoryBackend::new();
        let cache = CartCache::default();
        let user = UserId::generate();
        let items = cart_with_items(&backend, &cache, user).await;
        let service = CheckoutService::new(backend.clone(), cache);

        backend.fail_on(Table::OrderItems, Operation::Insert);
        let err = service.checkout(Some(user), &items).await.unwrap_err();

        assert_eq!(err.stage, CheckoutStage::CreateOrderLines);
        assert!(err.order_id.is_some());
        assert_eq!(err.notice().message, "Failed to place order");
        assert_eq!(err.notice().level, NoticeLevel::Error);

        assert_eq!(backend.rows(Table::Orders).len(), 1);
        assert!(backend.rows(Table::OrderItems).is_empty());
        assert_eq!(backend.rows(Table::CartItems).len(), 2);
        assert_eq!(backend.call_count(Operation::Delete, Table::CartItems), 0);
    }

    #[tokio::test]
    async fn test_failed_order_insert_stops_everything() {
        let backend = MemoryBackend::new();
        let cache = CartCache::default();
        let user = UserId::generate();
        let items = cart_with_items(&backend, &cache, user).await;
        let service = CheckoutService::new(backend.clone(), cache);

        backend.fail_on(Table::Orders, Operation::Insert);
        let err = service.checkout(Some(user), &items).await.unwrap_err();

        assert_eq!(err.stage, CheckoutStage::CreateOrder);
        assert!(err.order_id.is_none());
        assert_eq!(backend.call_count(Operation::Insert, Table::OrderItems), 0);
    }

    #[tokio::test]
    async fn test_failed_cart_clear_reports_stage() {
        let backend = MemoryBackend::new();
        let cache = CartCache::default();
        let user = UserId::generate();
        let items = cart_with_items(&backend, &cache, user).await;
        let service = CheckoutService::new(backend.clone(), cache);

        backend.fail_on(Table::CartItems, Operation::Delete);
        let err = service.checkout(Some(user), &items).await.unwrap_err();

        assert_eq!(err.stage, CheckoutStage::ClearCart);
        assert!(matches!(err.source, StoreError::Backend(_)));
        assert_eq!(backend.rows(Table::OrderItems).len(), 2);
        assert_eq!(backend.rows(Table::CartItems).len(), 2);
    }

    #[tokio::test]
    async fn test_clearing_leaves_other_users_carts() {
        let backend = MemoryBackend::new();
        let cache = CartCache::default();
        let user = UserId::generate();
        let other = UserId::generate();
        let items = cart_with_items(&backend, &cache, user).await;
        let others = cart_with_items(&backend, &cache, other).await;
        let service = CheckoutService::new(backend.clone(), cache.clone());

        service.checkout(Some(user), &items).await.unwrap();

        let remaining = RemoteCartStore::new(backend.clone(), other, cache)
            .items()
            .await
            .unwrap();
        assert_eq!(remaining.len(), others.len());
        assert_eq!(backend.call_count(Operation::Delete, Table::CartItems), 1);
    }
}
