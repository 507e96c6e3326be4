//! External bearer-token verification seam.
//!
//! The engine never parses tokens itself; it hands the opaque credential to
//! a verifier and works with the returned claims.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("expired token")]
    Expired,
    /// The verification backend itself failed; distinct from a bad token so
    /// the caller can report a server-side error, but still fail closed.
    #[error("token verification unavailable: {0}")]
    Infrastructure(String),
}

/// Claims the decision engine needs from a verified token. `subject`,
/// `email`, and `session_id` are required; a token without them is invalid.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    pub subject: Uuid,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub mfa_enabled: bool,
    pub session_id: Uuid,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

/// Stateless "credential in, claims or failure out" capability.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify_access_token(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

/// Lightweight email sanity check before trusting claim contents.
fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Shared claim validation: structurally present is not enough, the
/// identifying claims must also be usable.
fn validate_claims(claims: TokenClaims) -> Result<TokenClaims, TokenError> {
    if claims.subject.is_nil() || claims.session_id.is_nil() || !valid_email(&claims.email) {
        return Err(TokenError::Invalid);
    }
    Ok(claims)
}

/// Introspection-style verifier: POSTs the credential to an external
/// endpoint that answers with an `active` flag plus claims.
pub struct RemoteTokenVerifier {
    url: String,
    client: Client,
    secret: SecretString,
}

impl RemoteTokenVerifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: String, secret: SecretString, user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| anyhow::anyhow!("Failed to build introspection client: {err}"))?;
        Ok(Self {
            url,
            client,
            secret,
        })
    }
}

#[async_trait]
impl TokenVerifier for RemoteTokenVerifier {
    async fn verify_access_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.secret.expose_secret())
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|err| {
                error!(error = %err, "token introspection request failed");
                TokenError::Infrastructure(err.to_string())
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(TokenError::Infrastructure(format!(
                "introspection endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(TokenError::Invalid);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| TokenError::Infrastructure(err.to_string()))?;

        if !body
            .get("active")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            // Introspection reports expiry as inactive with a reason.
            if body.get("reason").and_then(Value::as_str) == Some("expired") {
                return Err(TokenError::Expired);
            }
            return Err(TokenError::Invalid);
        }

        let claims: TokenClaims =
            serde_json::from_value(body).map_err(|_| TokenError::Invalid)?;
        validate_claims(claims)
    }
}

/// Fixed token table for tests and single-node bootstrap.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, TokenClaims>,
}

impl StaticTokenVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, claims: TokenClaims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify_access_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.tokens.get(token).cloned().ok_or(TokenError::Invalid)?;
        validate_claims(claims)
    }
}
