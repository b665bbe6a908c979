//! Authentication route handlers.
//!
//! Sign-in stores the user in the session, starts the realtime listener that
//! keeps the user's cached cart fresh, and applies the configured guest cart
//! policy. Sign-out stops the listener and forgets the user; the guest cart
//! in the session is left alone.

use axum::{Json, extract::State};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{error, info, instrument, warn};

use sundry_core::{Email, UserId};

use crate::backend::{AuthSession, SignUpOutcome};
use crate::cart::{MigrationReport, RemoteCartStore, migrate_guest_cart};
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, RequireAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::notice::Notice;
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Sign-up request body.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Public view of the signed-in user.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl From<&CurrentUser> for UserView {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
        }
    }
}

/// Response to login, sign-up and logout.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// The signed-in user; absent after logout or while confirmation is pending.
    pub user: Option<UserView>,
    /// What happened to the guest cart, when sign-in completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_cart: Option<MigrationReport>,
    pub notice: Notice,
}

fn parse_email(raw: &str) -> Result<Email> {
    Email::parse(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

/// Sign in with email and password.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let email = parse_email(&req.email)?;
    let password = SecretString::from(req.password);

    let auth_session = state.auth().sign_in_with_password(&email, &password).await?;
    let (user, guest_cart) = complete_sign_in(&state, &session, &auth_session).await?;

    Ok(Json(AuthResponse {
        user: Some(UserView::from(&user)),
        guest_cart,
        notice: Notice::success("Welcome back!"),
    }))
}

/// Create an account. Signs in straight away unless the backend requires
/// email confirmation first.
#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<SignUpRequest>,
) -> Result<Json<AuthResponse>> {
    let email = parse_email(&req.email)?;
    let password = SecretString::from(req.password);
    let full_name = req.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::BadRequest("Full name is required".to_string()));
    }

    match state.auth().sign_up(&email, &password, full_name).await? {
        SignUpOutcome::SignedIn(auth_session) => {
            let (user, guest_cart) = complete_sign_in(&state, &session, &auth_session).await?;
            Ok(Json(AuthResponse {
                user: Some(UserView::from(&user)),
                guest_cart,
                notice: Notice::success("Account created successfully!"),
            }))
        }
        SignUpOutcome::ConfirmationRequired(pending) => {
            info!(user_id = %pending.id, "Sign-up awaiting email confirmation");
            Ok(Json(AuthResponse {
                user: None,
                guest_cart: None,
                notice: Notice::info("Account created! Check your email to confirm it."),
            }))
        }
    }
}

/// Sign out.
///
/// The session is cleared even if the backend fails to revoke the token.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
) -> Result<Json<AuthResponse>> {
    if let Some(user) = user {
        if let Err(e) = state.auth().sign_out(&user.access_token()).await {
            warn!(user_id = %user.id, error = %e, "Failed to revoke access token");
        }
        state.sync().detach(user.id).await;
        state.cart_cache().invalidate(user.id).await;
        clear_current_user(&session).await?;
        clear_sentry_user();
        info!(user_id = %user.id, "User signed out");
    }

    Ok(Json(AuthResponse {
        user: None,
        guest_cart: None,
        notice: Notice::success("Signed out"),
    }))
}

/// The signed-in user.
pub async fn me(RequireAuth(user): RequireAuth) -> Json<UserView> {
    Json(UserView::from(&user))
}

/// Store the user in the session, start cart sync and apply the guest cart
/// policy.
///
/// Sync and guest cart failures are logged; they do not undo the sign-in.
async fn complete_sign_in(
    state: &AppState,
    session: &Session,
    auth_session: &AuthSession,
) -> Result<(CurrentUser, Option<MigrationReport>)> {
    let user = CurrentUser::from_session(auth_session);
    set_current_user(session, &user).await?;
    set_sentry_user(&user.id, user.email.as_deref());

    let token = user.access_token();
    let feed = state.realtime().with_access_token(&token);
    if let Err(e) = state.sync().attach(&feed, state.cart_cache(), user.id).await {
        warn!(user_id = %user.id, error = %e, "Cart sync unavailable; relying on cache expiry");
    }

    let remote = RemoteCartStore::new(
        state.backend().with_access_token(&token),
        user.id,
        state.cart_cache().clone(),
    );
    let policy = state.config().cart.guest_cart_policy;
    let guest_cart = match migrate_guest_cart(policy, session, &remote).await {
        Ok(report) => Some(report),
        Err(e) => {
            error!(user_id = %user.id, ?policy, error = %e, "Guest cart migration failed");
            None
        }
    };

    info!(user_id = %user.id, "User signed in");
    Ok((user, guest_cart))
}
