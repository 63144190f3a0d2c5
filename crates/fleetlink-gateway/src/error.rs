//! API error types and responses.
//!
//! This module defines the error format of the non-RPC endpoints. RPC
//! failures travel inside JSON-RPC error envelopes instead, see
//! [`crate::handlers::rpc`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use fleetlink_auth::AuthError;
use fleetlink_control::ControlError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller did not identify itself.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller lacks a required capability.
    #[error("forbidden")]
    Forbidden,

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A bus peer needed for the request is not reachable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => Self::Unauthorized,
            AuthError::Forbidden { .. } => Self::Forbidden,
            AuthError::InvalidPublicKey(msg) => Self::BadRequest(msg),
            AuthError::Store(store_err) => {
                tracing::error!(error = %store_err, "Auth store error");
                Self::Internal("authorization store error".to_string())
            }
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::InvalidAddress(_)
            | ControlError::InvalidParams(_)
            | ControlError::InvalidConfig(_)
            | ControlError::MethodNotFound(_) => Self::BadRequest(err.to_string()),
            ControlError::Unreachable(_) | ControlError::Timeout(_) | ControlError::Discovery(_) => {
                Self::Unavailable(err.to_string())
            }
            ControlError::Auth(auth_err) => Self::from(auth_err),
            ControlError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                Self::Internal("storage error".to_string())
            }
            ControlError::Remote { .. }
            | ControlError::InvalidTransition { .. }
            | ControlError::Internal(_) => {
                tracing::error!(error = %err, "Internal error");
                Self::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BadRequest("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unavailable("control".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn control_errors_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(ControlError::InvalidAddress("ftp://vc".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(ControlError::Timeout("query".into())),
            ApiError::Unavailable(_)
        ));
        assert!(matches!(
            ApiError::from(ControlError::Auth(AuthError::MissingCredentials)),
            ApiError::Unauthorized
        ));
    }
}
