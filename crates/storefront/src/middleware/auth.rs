//! Authentication extractors.
//!
//! The signed-in user lives in the session under
//! [`session_keys::CURRENT_USER`]; no entry means a guest. An access token
//! about to expire is refreshed before the handler sees the user.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::models::{CurrentUser, session_keys};
use crate::notice::Notice;
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Error returned when authentication is required but nobody is signed in.
#[derive(Debug)]
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "notice": Notice::info("Please sign in") })),
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(OptionalAuth(user)) = OptionalAuth::from_request_parts(parts, state).await;

        user.map(Self).ok_or(AuthRejection)
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is
/// signed in. An unreadable session entry counts as signed out, as does an
/// expired access token that cannot be refreshed.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(session) = parts.extensions.get::<Session>().cloned() else {
            return Ok(Self(None));
        };

        let user = session
            .get::<CurrentUser>(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten();

        let user = match user {
            Some(user) if user.is_expired() => {
                refresh_current_user(&AppState::from_ref(state), &session, &user).await
            }
            user => user,
        };

        Ok(Self(user))
    }
}

/// Swap `user`'s expiring access token for a new one and store it in the
/// session. The user is signed out of this session when that fails.
#[instrument(skip_all, fields(user_id = %user.id))]
async fn refresh_current_user(
    state: &AppState,
    session: &Session,
    user: &CurrentUser,
) -> Option<CurrentUser> {
    let Some(refresh_token) = user.refresh_token() else {
        warn!("Access token expired and no refresh token is held; signing out");
        sign_out_expired(state, session, user).await;
        return None;
    };

    let auth_session = match state.auth().refresh_session(&refresh_token).await {
        Ok(auth_session) => auth_session,
        Err(e) => {
            warn!(error = %e, "Access token refresh failed; signing out");
            sign_out_expired(state, session, user).await;
            return None;
        }
    };

    let refreshed = CurrentUser::from_session(&auth_session);
    if let Err(e) = session.insert(session_keys::CURRENT_USER, &refreshed).await {
        warn!(error = %e, "Failed to store refreshed access token");
    }

    // The running listener joined with the old token.
    let feed = state.realtime().with_access_token(&refreshed.access_token());
    if let Err(e) = state
        .sync()
        .renew(&feed, state.cart_cache(), refreshed.id)
        .await
    {
        warn!(error = %e, "Cart sync unavailable after token refresh; relying on cache expiry");
    }

    info!("Access token refreshed");
    Some(refreshed)
}

async fn sign_out_expired(state: &AppState, session: &Session, user: &CurrentUser) {
    if let Err(e) = clear_current_user(session).await {
        warn!(error = %e, "Failed to clear expired user from session");
    }
    state.sync().detach(user.id).await;
    state.cart_cache().invalidate(user.id).await;
}

/// Helper to set the current user in the session.
///
/// Cycles the session ID first so a pre-login session cookie cannot be
/// reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// Only the user entry is removed; a guest cart kept in the same session
/// survives sign-out.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    Ok(())
}
