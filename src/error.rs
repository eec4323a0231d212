use crate::storage::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Empty refresh token")]
    EmptyToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Refresh token not found")]
    NotFound,
    #[error("Refresh token expired")]
    Expired,
    #[error("Token signing failed")]
    Signing,
    #[error("Entropy source unavailable")]
    Entropy,
    #[error("Token hashing failed")]
    Hashing,
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to issue token pair: {0}")]
    Issuance(#[source] Box<AppError>),
    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub(crate) fn issuance(cause: Self) -> Self {
        Self::Issuance(Box::new(cause))
    }

    /// Whether the caller, rather than the server, is at fault.
    #[must_use]
    pub const fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::EmptyToken | Self::InvalidToken | Self::NotFound | Self::Expired)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Validation(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::EmptyToken => {
                tracing::debug!("Empty refresh token");
                (StatusCode::BAD_REQUEST, "refresh_token is required".to_string())
            }
            Self::InvalidToken => {
                tracing::debug!("Invalid access token");
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            Self::NotFound => {
                tracing::debug!("Refresh token not found");
                (StatusCode::NOT_FOUND, "failed to refresh tokens: token not found".to_string())
            }
            Self::Expired => {
                tracing::debug!("Refresh token expired");
                (StatusCode::UNAUTHORIZED, "failed to refresh tokens: token expired".to_string())
            }
            e => {
                tracing::error!(error = %e, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::EmptyToken, StatusCode::BAD_REQUEST),
            (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (AppError::Expired, StatusCode::UNAUTHORIZED),
            (AppError::Store(StoreError::Unavailable("down".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::issuance(AppError::Entropy), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_issuance_keeps_cause() {
        let err = AppError::issuance(AppError::Store(StoreError::NotFound));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("Storage error: Record not found"));
        assert!(!err.is_client_fault());
        assert!(AppError::Expired.is_client_fault());
    }
}
