//! Hosted authentication client.
//!
//! Password sign-in, sign-up, token refresh and sign-out against the
//! backend's `/auth/v1` endpoints. Tokens never leave [`SecretString`] outside of the request that
//! needs them.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use sundry_core::{Email, UserId};

use crate::config::BackendConfig;

/// Errors that can occur when interacting with the auth service.
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Auth service rejected the request.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Email/password pair did not match an account.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configured backend URL cannot address the auth endpoints.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// An account as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// A signed-in session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Seconds until `access_token` expires.
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// Result of a sign-up.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// The project auto-confirms accounts; the user is signed in.
    SignedIn(AuthSession),
    /// The account exists but must be confirmed by email before sign-in.
    ConfirmationRequired(AuthUser),
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize)]
struct UserResponse {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Deserialize, Default)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
}

#[derive(Deserialize)]
struct SessionResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    user: UserResponse,
}

/// Sign-up returns a session when confirmation is disabled, the bare user
/// otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(SessionResponse),
    User(UserResponse),
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<UserResponse> for AuthUser {
    fn from(user: UserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.user_metadata.full_name,
        }
    }
}

impl From<SessionResponse> for AuthSession {
    fn from(session: SessionResponse) -> Self {
        Self {
            access_token: SecretString::from(session.access_token),
            refresh_token: session.refresh_token.map(SecretString::from),
            expires_in: session.expires_in,
            user: session.user.into(),
        }
    }
}

// =============================================================================
// AuthClient
// =============================================================================

/// Client for the backend's authentication endpoints.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthClientInner>,
}

struct AuthClientInner {
    client: reqwest::Client,
    auth_url: Url,
    anon_key: SecretString,
}

impl AuthClient {
    /// Create an auth client for the project at `config.url`.
    ///
    /// # Errors
    ///
    /// Returns error if the auth endpoint cannot be derived from the URL.
    pub fn new(config: &BackendConfig) -> Result<Self, AuthError> {
        Ok(Self {
            inner: Arc::new(AuthClientInner {
                client: reqwest::Client::new(),
                auth_url: config.url.join("auth/v1/")?,
                anon_key: config.anon_key.clone(),
            }),
        })
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] when the pair is rejected.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        let url = self.token_url("password")?;
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
        });

        let text = self.post(url, &body, None).await?;
        let session: SessionResponse = serde_json::from_str(&text)?;
        Ok(session.into())
    }

    /// Create an account, storing `full_name` in the user metadata.
    ///
    /// # Errors
    ///
    /// Returns error if the auth service rejects the sign-up.
    #[instrument(skip(self, password, full_name), fields(email = %email))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        full_name: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        let url = self.inner.auth_url.join("signup")?;
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
            "data": { "full_name": full_name },
        });

        let text = self.post(url, &body, None).await?;
        Ok(match serde_json::from_str::<SignUpResponse>(&text)? {
            SignUpResponse::Session(session) => SignUpOutcome::SignedIn(session.into()),
            SignUpResponse::User(user) => SignUpOutcome::ConfirmationRequired(user.into()),
        })
    }

    /// Exchange a refresh token for a new session.
    ///
    /// The refresh token is single-use: the returned session carries its
    /// replacement.
    ///
    /// # Errors
    ///
    /// Returns error if the refresh token has been revoked or already used.
    #[instrument(skip_all)]
    pub async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        let url = self.token_url("refresh_token")?;
        let body = serde_json::json!({ "refresh_token": refresh_token.expose_secret() });

        let text = self.post(url, &body, None).await?;
        let session: SessionResponse = serde_json::from_str(&text)?;
        Ok(session.into())
    }

    /// Revoke the session behind `access_token`.
    ///
    /// # Errors
    ///
    /// Returns error if the auth service rejects the request.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, access_token: &SecretString) -> Result<(), AuthError> {
        let url = self.inner.auth_url.join("logout")?;
        self.post(url, &serde_json::json!({}), Some(access_token))
            .await
            .map(drop)
    }

    fn token_url(&self, grant_type: &str) -> Result<Url, AuthError> {
        let mut url = self.inner.auth_url.join("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        Ok(url)
    }

    async fn post(
        &self,
        url: Url,
        body: &serde_json::Value,
        bearer: Option<&SecretString>,
    ) -> Result<String, AuthError> {
        let bearer = bearer.unwrap_or(&self.inner.anon_key).expose_secret();

        let response = self
            .inner
            .client
            .post(url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .header(AUTHORIZATION, format!("Bearer {bearer}"))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return Ok(text);
        }

        Err(classify_error(status.as_u16(), &text))
    }
}

fn classify_error(status: u16, body: &str) -> AuthError {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();

    let invalid_grant = parsed.as_ref().is_some_and(|e| {
        e.error_code.as_deref() == Some("invalid_credentials")
            || e.error.as_deref() == Some("invalid_grant")
    });
    if invalid_grant {
        return AuthError::InvalidCredentials;
    }

    let message = parsed
        .and_then(|e| e.msg.or(e.error_description).or(e.message))
        .unwrap_or_else(|| body.chars().take(200).collect());

    AuthError::Api { status, message }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_response_into_session() {
        let json = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "user": {
                "id": "c1d2e3f4-0000-4000-8000-000000000001",
                "email": "shopper@example.com",
                "user_metadata": { "full_name": "Sam Shopper" }
            }
        }"#;

        let session: AuthSession = serde_json::from_str::<SessionResponse>(json).unwrap().into();
        assert_eq!(session.access_token.expose_secret(), "jwt");
        assert_eq!(session.expires_in, Some(3600));
        assert_eq!(session.user.full_name.as_deref(), Some("Sam Shopper"));
    }

    #[test]
    fn test_token_url_carries_grant_type() {
        let client = AuthClient::new(&BackendConfig {
            url: Url::parse("https://project.example.co/").unwrap(),
            anon_key: SecretString::from("anon-key"),
        })
        .unwrap();

        assert_eq!(
            client.token_url("refresh_token").unwrap().as_str(),
            "https://project.example.co/auth/v1/token?grant_type=refresh_token"
        );
    }

    #[test]
    fn test_classify_used_refresh_token() {
        let body = r#"{"code":400,"error_code":"refresh_token_already_used","msg":"Invalid Refresh Token: Already Used"}"#;
        match classify_error(400, body) {
            AuthError::Api { message, .. } => {
                assert_eq!(message, "Invalid Refresh Token: Already Used");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_sign_up_without_session_requires_confirmation() {
        let json = r#"{
            "id": "c1d2e3f4-0000-4000-8000-000000000001",
            "email": "new@example.com",
            "confirmation_sent_at": "2024-03-01T10:00:00Z",
            "user_metadata": {}
        }"#;

        let parsed: SignUpResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, SignUpResponse::User(_)));
    }

    #[test]
    fn test_classify_invalid_credentials() {
        let body = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
        assert!(matches!(classify_error(400, body), AuthError::InvalidCredentials));

        let legacy = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert!(matches!(classify_error(400, legacy), AuthError::InvalidCredentials));
    }

    #[test]
    fn test_classify_other_errors_keep_message() {
        let body = r#"{"code":422,"msg":"Password should be at least 6 characters"}"#;
        match classify_error(422, body) {
            AuthError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Password should be at least 6 characters");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
