//! Session-related types.
//!
//! Types stored in the session for authentication state.

use std::fmt;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use sundry_core::UserId;

use crate::backend::AuthSession;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user, plus
/// the tokens backend calls are made with. Implements `Debug` manually to
/// redact the tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Backend user ID.
    pub id: UserId,
    /// User's email address, when the account has one.
    pub email: Option<String>,
    /// Display name from sign-up metadata.
    pub full_name: Option<String>,
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Unix timestamp when `access_token` expires.
    #[serde(default)]
    access_token_expires_at: Option<i64>,
}

impl CurrentUser {
    /// Build the session identity from a fresh sign-in or token refresh.
    #[must_use]
    pub fn from_session(session: &AuthSession) -> Self {
        let now = Utc::now().timestamp();

        Self {
            id: session.user.id,
            email: session.user.email.clone(),
            full_name: session.user.full_name.clone(),
            access_token: session.access_token.expose_secret().to_string(),
            refresh_token: session
                .refresh_token
                .as_ref()
                .map(|token| token.expose_secret().to_string()),
            access_token_expires_at: session
                .expires_in
                .and_then(|secs| i64::try_from(secs).ok())
                .map(|secs| now.saturating_add(secs)),
        }
    }

    /// Token for backend calls made on this user's behalf.
    #[must_use]
    pub fn access_token(&self) -> SecretString {
        SecretString::from(self.access_token.clone())
    }

    /// Token to exchange for a new access token, if the backend issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.refresh_token.clone().map(SecretString::from)
    }

    /// Check if the access token has expired (with 60s buffer).
    ///
    /// A token issued without a lifetime never expires here.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    fn is_expired_at(&self, now: i64) -> bool {
        self.access_token_expires_at
            .is_some_and(|expires_at| now >= expires_at - TOKEN_EXPIRY_SKEW_SECS)
    }
}

/// Seconds before expiry at which an access token is treated as expired.
const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("access_token_expires_at", &self.access_token_expires_at)
            .finish()
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
