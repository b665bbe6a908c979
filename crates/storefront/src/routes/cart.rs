//! Cart route handlers.
//!
//! Every handler resolves the visitor's cart from the session: signed-in
//! users get their `cart_items` rows (queried with their access token),
//! guests get the cart kept in their session. Responses carry the cart after
//! the action and, for mutations, the notice to show.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use sundry_core::{ProductId, Quantity};

use crate::backend::RestBackend;
use crate::cart::{CartResolver, CartSnapshot, LineKey};
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::notice::Notice;
use crate::state::AppState;

pub(crate) type Resolver = CartResolver<Session, RestBackend>;

/// The cart for this request's visitor.
pub(crate) fn resolver(state: &AppState, session: Session, user: Option<&CurrentUser>) -> Resolver {
    let backend = match user {
        Some(user) => state.backend().with_access_token(&user.access_token()),
        None => state.backend().clone(),
    };

    CartResolver::resolve(
        user.map(|user| user.id),
        session,
        backend,
        state.cart_cache().clone(),
    )
}

/// Cart state plus the notice for the action that produced it.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: CartSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

/// Add to cart request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: Option<i64>,
}

/// Update quantity request body.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub key: LineKey,
    pub quantity: i64,
}

/// Remove line request body.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub key: LineKey,
}

/// Current cart.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Json<CartResponse>> {
    let cart = resolver(&state, session, user.as_ref()).snapshot().await?;
    Ok(Json(CartResponse { cart, notice: None }))
}

/// Add a product to the cart.
#[instrument(skip(state, user, session), fields(product_id = %req.product_id))]
pub async fn add(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartResponse>> {
    let quantity = Quantity::new(req.quantity.unwrap_or(1))
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let product = state.catalog().get_product(req.product_id).await?;

    let cart = resolver(&state, session, user.as_ref());
    let notice = cart.add_item(&product, quantity).await?;

    Ok(Json(CartResponse {
        cart: cart.snapshot().await?,
        notice: Some(notice),
    }))
}

/// Set a line's quantity. Zero or less removes the line.
#[instrument(skip(state, user, session), fields(key = %req.key, quantity = req.quantity))]
pub async fn update(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    Json(req): Json<UpdateCartRequest>,
) -> Result<Json<CartResponse>> {
    let cart = resolver(&state, session, user.as_ref());
    let notice = cart.update_quantity(req.key, req.quantity).await?;

    Ok(Json(CartResponse {
        cart: cart.snapshot().await?,
        notice,
    }))
}

/// Remove a line.
#[instrument(skip(state, user, session), fields(key = %req.key))]
pub async fn remove(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    Json(req): Json<RemoveFromCartRequest>,
) -> Result<Json<CartResponse>> {
    let cart = resolver(&state, session, user.as_ref());
    let notice = cart.remove_item(req.key).await?;

    Ok(Json(CartResponse {
        cart: cart.snapshot().await?,
        notice: Some(notice),
    }))
}
