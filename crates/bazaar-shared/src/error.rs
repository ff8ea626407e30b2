use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Stable, caller-facing classification of every failure.
///
/// Transport layers map a kind to a status code; the kind itself never
/// changes for a given failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    AuthenticationFailure,
    AuthorizationFailure,
    NotFound,
    Conflict,
    TransactionFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::AuthenticationFailure => "authentication_failure",
            ErrorKind::AuthorizationFailure => "authorization_failure",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TransactionFailed => "transaction_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the Token Authority.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token's `exp` is at or before the current time.
    #[error("Token expired")]
    Expired,

    /// Bad structure, bad signature, or a required claim is absent.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// The token carries no `exp` claim at all and could never be time-bounded.
    #[error("Token has no expiry")]
    MissingExpiry,

    /// `now + ttl` does not fit in a timestamp.
    #[error("Token lifetime out of range")]
    LifetimeOutOfRange,

    /// Claims could not be encoded while issuing.
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

impl TokenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenError::Encoding(_) | TokenError::LifetimeOutOfRange => ErrorKind::Internal,
            _ => ErrorKind::AuthenticationFailure,
        }
    }
}

/// Errors produced by the access gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Unknown user, inactive user and wrong password are deliberately
    /// indistinguishable.
    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The password verifier could not produce a hash.
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::InvalidCredentials => ErrorKind::AuthenticationFailure,
            AccessError::Forbidden(_) => ErrorKind::AuthorizationFailure,
            AccessError::Hashing(_) => ErrorKind::Internal,
        }
    }
}
