//! Stateless identity tokens.
//!
//! A token is `base64url(claims json) "." base64url(ed25519 signature)`.
//! The signature covers the encoded claims segment exactly as transmitted.
//!
//! Tokens are immutable once issued and cannot be revoked before `exp`:
//! there is no server-side session or blacklist. Callers that must react to
//! account changes re-check the account, not the token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::capability::RoleFlags;
use crate::error::TokenError;

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Verified identity carried by a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    /// Username.
    pub subject: String,
    pub user_id: i64,
    pub roles: RoleFlags,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds. The token is rejected once `now >= expires_at`.
    pub expires_at: i64,
}

impl Claims {
    /// Claims valid for `ttl` from now. Fails if the expiry is not representable.
    pub fn new(
        subject: &str,
        user_id: i64,
        roles: RoleFlags,
        ttl: Duration,
    ) -> Result<Self, TokenError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::LifetimeOutOfRange)?;
        Ok(Self {
            subject: subject.to_string(),
            user_id,
            roles,
            issued_at: now.timestamp(),
            expires_at: expires_at.timestamp(),
        })
    }
}

/// Claims as they appear on the wire. Every field is optional here so that
/// an absent claim is reported precisely instead of as a parse failure.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(flatten)]
    roles: RoleFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

impl From<&Claims> for WireClaims {
    fn from(claims: &Claims) -> Self {
        Self {
            sub: Some(claims.subject.clone()),
            id: Some(claims.user_id),
            roles: claims.roles,
            iat: Some(claims.issued_at),
            exp: Some(claims.expires_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Authority
// ---------------------------------------------------------------------------

/// Issues and verifies tokens with a single Ed25519 key.
///
/// Built once from configuration at startup and shared read-only.
#[derive(Clone)]
pub struct TokenAuthority {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl TokenAuthority {
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// A random key. Tokens issued with it die with the process.
    pub fn ephemeral() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_secret_bytes(signing_key.as_bytes())
    }

    /// Issue a token for the given identity valid for `ttl` from now.
    pub fn issue(
        &self,
        username: &str,
        user_id: i64,
        roles: RoleFlags,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        self.sign(&Claims::new(username, user_id, roles, ttl)?)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        self.sign_wire(&WireClaims::from(claims))
    }

    fn sign_wire(&self, wire: &WireClaims) -> Result<String, TokenError> {
        let json = serde_json::to_vec(wire).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.signing_key.sign(payload.as_bytes());
        Ok(format!(
            "{payload}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    /// Verify signature and expiry against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify signature and expiry against `now` (Unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| TokenError::Malformed("expected two segments".into()))?;

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed("signature is not base64url".into()))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|_| TokenError::Malformed("bad signature length".into()))?;
        self.verifying_key
            .verify(payload.as_bytes(), &signature)
            .map_err(|_| TokenError::Malformed("signature mismatch".into()))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed("payload is not base64url".into()))?;
        let wire: WireClaims = serde_json::from_slice(&json)
            .map_err(|e| TokenError::Malformed(format!("payload: {e}")))?;

        let expires_at = wire.exp.ok_or(TokenError::MissingExpiry)?;
        if now >= expires_at {
            return Err(TokenError::Expired);
        }

        let (Some(subject), Some(user_id)) = (wire.sub, wire.id) else {
            return Err(TokenError::Malformed("missing subject or id".into()));
        };

        Ok(Claims {
            subject,
            user_id,
            roles: wire.roles,
            issued_at: wire.iat.unwrap_or(0),
            expires_at,
        })
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("verifying_key", &hex::encode(self.verifying_key.as_bytes()))
            .finish_non_exhaustive()
    }
}
