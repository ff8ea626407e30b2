use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bazaar_shared::{AccessError, ErrorKind, TokenError};
use bazaar_store::StoreError;
use thiserror::Error;

/// Every failure leaving the HTTP layer: a stable kind plus a detail.
#[derive(Debug, Error)]
#[error("{kind}: {detail}")]
pub struct ServerError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ServerError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationFailure, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            ErrorKind::AuthorizationFailure => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::TransactionFailed => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        let kind = err.kind();
        match kind {
            ErrorKind::Internal => {
                tracing::error!(error = %err, "store failure");
                Self::internal("Internal server error")
            }
            ErrorKind::TransactionFailed => {
                tracing::warn!(error = %err, "transaction failed");
                Self::new(kind, "The write was aborted and rolled back, retry later")
            }
            _ => Self::new(kind, err.to_string()),
        }
    }
}

impl From<TokenError> for ServerError {
    fn from(err: TokenError) -> Self {
        if err.kind() == ErrorKind::Internal {
            tracing::error!(error = %err, "token encoding failed");
            return Self::internal("Internal server error");
        }
        Self::new(err.kind(), err.to_string())
    }
}

impl From<AccessError> for ServerError {
    fn from(err: AccessError) -> Self {
        if err.kind() == ErrorKind::Internal {
            tracing::error!(error = %err, "password hashing failed");
            return Self::internal("Internal server error");
        }
        Self::new(err.kind(), err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.kind,
            "detail": self.detail,
        });

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], axum::Json(body)).into_response()
        } else {
            (status, axum::Json(body)).into_response()
        }
    }
}
