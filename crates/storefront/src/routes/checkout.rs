//! Checkout route handler.

use axum::{Json, extract::State};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::backend::{Order, OrderLine};
use crate::checkout::{CheckoutOutcome, CheckoutService};
use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::notice::Notice;
use crate::state::AppState;

use super::cart::resolver;

/// Checkout response body, tagged by `status`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutResponse {
    Placed {
        order: Order,
        lines: Vec<OrderLine>,
        notice: Notice,
    },
    EmptyCart,
    SignInRequired {
        redirect: &'static str,
        notice: Notice,
    },
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        match outcome {
            CheckoutOutcome::Placed {
                order,
                lines,
                notice,
            } => Self::Placed {
                order,
                lines,
                notice,
            },
            CheckoutOutcome::EmptyCart => Self::EmptyCart,
            CheckoutOutcome::SignInRequired { redirect, notice } => {
                Self::SignInRequired { redirect, notice }
            }
        }
    }
}

/// Place an order for the signed-in visitor's cart.
#[instrument(skip_all)]
pub async fn checkout(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Json<CheckoutResponse>> {
    let Some(user) = user else {
        let service = CheckoutService::new(state.backend().clone(), state.cart_cache().clone());
        return Ok(Json(service.checkout(None, &[]).await?.into()));
    };

    let items = resolver(&state, session, Some(&user)).items().await?;
    let service = CheckoutService::new(
        state.backend().with_access_token(&user.access_token()),
        state.cart_cache().clone(),
    );

    Ok(Json(service.checkout(Some(user.id), &items).await?.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::checkout::SIGN_IN_PATH;

    #[test]
    fn test_sign_in_required_serializes_redirect() {
        let json = serde_json::to_value(CheckoutResponse::from(CheckoutOutcome::SignInRequired {
            redirect: SIGN_IN_PATH,
            notice: Notice::info("Please sign in to checkout"),
        }))
        .unwrap();

        assert_eq!(json["status"], "sign_in_required");
        assert_eq!(json["redirect"], "/auth");
        assert_eq!(json["notice"]["level"], "info");
    }

    #[test]
    fn test_empty_cart_serializes_status_only() {
        let json = serde_json::to_value(CheckoutResponse::EmptyCart).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "empty_cart" }));
    }
}
