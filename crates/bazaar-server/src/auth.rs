//! Access gate: credential checks, token issuance and the bearer extractor.
//!
//! Capability precedence itself lives in `bazaar_shared::capability`; this
//! module only connects it to accounts and HTTP.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use bazaar_shared::password::PasswordVerifier;
use bazaar_shared::{AccessError, Claims, TokenAuthority, TokenError};
use bazaar_store::Database;
use tracing::debug;

use crate::api::AppState;
use crate::error::ServerError;

/// Verifies credentials and tokens. Cheap to clone.
#[derive(Clone)]
pub struct AccessGate {
    tokens: TokenAuthority,
    verifier: Arc<dyn PasswordVerifier>,
    token_ttl: chrono::Duration,
    /// Hash of a throwaway password in the active format. Unknown usernames
    /// are verified against it.
    dummy_verifier: Arc<str>,
}

impl AccessGate {
    pub fn new(
        tokens: TokenAuthority,
        verifier: Arc<dyn PasswordVerifier>,
        token_ttl: chrono::Duration,
    ) -> Result<Self, AccessError> {
        let dummy_verifier = verifier.hash("bazaar-unknown-user")?.into();
        Ok(Self {
            tokens,
            verifier,
            token_ttl,
            dummy_verifier,
        })
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AccessError> {
        self.verifier.hash(password)
    }

    /// Check a username/password pair and return fresh claims for the account.
    ///
    /// Unknown user, inactive user and wrong password all yield
    /// [`AccessError::InvalidCredentials`].
    pub fn authenticate(
        &self,
        db: &Database,
        username: &str,
        password: &str,
    ) -> Result<Claims, ServerError> {
        let user = db.find_user_by_username(username)?;

        let accepted = match &user {
            Some(u) => self.verifier.verify(password, &u.password_verifier) && u.is_active,
            None => {
                // Keep the unknown-user path as slow as a real check.
                let _ = self.verifier.verify(password, &self.dummy_verifier);
                false
            }
        };

        match user {
            Some(u) if accepted => Ok(Claims::new(&u.username, u.id, u.roles, self.token_ttl)?),
            _ => {
                debug!(%username, "authentication rejected");
                Err(AccessError::InvalidCredentials.into())
            }
        }
    }

    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        self.tokens.sign(claims)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.tokens.verify(token)
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Verified claims of the caller, taken from `Authorization: Bearer <token>`.
///
/// Only the token is checked; account state is not re-read.
pub struct Authenticated(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServerError::unauthorized("Missing bearer token"))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| ServerError::unauthorized("Authorization scheme must be Bearer"))?;

        let claims = state.gate.verify(token.trim()).map_err(|e| {
            debug!(error = %e, "token rejected");
            ServerError::from(e)
        })?;
        Ok(Self(claims))
    }
}
