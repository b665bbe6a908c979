//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Every error response is a JSON body carrying the notice to show:
//! `{"notice": {"level": "error", "message": "..."}}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::backend::{AuthError, BackendError};
use crate::cart::{CartError, StoreError};
use crate::checkout::CheckoutError;
use crate::notice::Notice;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// A cart action failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout stopped part-way.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Guest cart handling at sign-in failed.
    #[error("Cart store error: {0}")]
    Store(#[from] StoreError),

    /// Backend call failed outside a cart action.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Session could not be read or written.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    notice: Notice,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Cart(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Cart(_) | Self::Checkout(_) | Self::Store(_) => StatusCode::BAD_GATEWAY,
            Self::Backend(BackendError::NotFound(_)) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Backend(_) => StatusCode::BAD_GATEWAY,
            Self::Auth(AuthError::InvalidCredentials) | Self::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Auth(AuthError::Api { status, .. }) if (400..500).contains(status) => {
                StatusCode::BAD_REQUEST
            }
            Self::Auth(_) => StatusCode::BAD_GATEWAY,
            Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The notice shown to the shopper. Internal details are not exposed.
    fn notice(&self) -> Notice {
        match self {
            Self::Cart(err) => err.notice(),
            Self::Checkout(err) => err.notice(),
            Self::Store(_) => Notice::error("Failed to update cart after sign-in"),
            Self::Backend(BackendError::NotFound(_)) => Notice::error("Not found"),
            Self::Backend(_) => Notice::error("External service error"),
            Self::Auth(AuthError::InvalidCredentials) => Notice::error("Invalid login credentials"),
            Self::Auth(AuthError::Api { status, message }) if (400..500).contains(status) => {
                Notice::error(message.clone())
            }
            Self::Auth(_) => Notice::error("Authentication error"),
            Self::Session(_) => Notice::error("Internal server error"),
            Self::NotFound(what) => Notice::error(format!("Not found: {what}")),
            Self::Unauthorized(msg) | Self::BadRequest(msg) => Notice::error(msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (
            status,
            Json(ErrorBody {
                notice: self.notice(),
            }),
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
