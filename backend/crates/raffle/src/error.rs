//! Raffle Error Types
//!
//! This module provides raffle-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

use crate::domain::provider::ProviderError;
use crate::domain::value_objects::PostReferenceError;

/// Raffle-specific result type alias
pub type ProxyResult<T> = Result<T, RaffleError>;

/// Raffle-specific error variants
///
/// Every failure of a request ends up here and is rendered at the handler
/// boundary as `{"error": ..., "code": ...}`.
#[derive(Debug, Error)]
pub enum RaffleError {
    /// Caller exceeded the inbound rate limit
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    /// Request body missing or not understood
    #[error("{0}")]
    InvalidRequest(String),

    /// Post URL could not be resolved to a post id
    #[error("Invalid post URL: {0}")]
    InvalidReference(#[from] PostReferenceError),

    #[error("Post not found")]
    NotFound,

    /// Provider outage, transport failure or timeout
    #[error("Content provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider throttled the proxy
    #[error("Content provider rate limit reached")]
    ProviderRateLimited { retry_after_secs: Option<u64> },

    /// Provider credentials were refused
    #[error("Content provider authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RaffleError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RaffleError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RaffleError::InvalidRequest(_) | RaffleError::InvalidReference(_) => {
                StatusCode::BAD_REQUEST
            }
            RaffleError::NotFound => StatusCode::NOT_FOUND,
            RaffleError::ProviderUnavailable(_)
            | RaffleError::ProviderRateLimited { .. }
            | RaffleError::AuthenticationFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            RaffleError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RaffleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RaffleError::RateLimited { .. } => ErrorKind::TooManyRequests,
            RaffleError::InvalidRequest(_) | RaffleError::InvalidReference(_) => {
                ErrorKind::BadRequest
            }
            RaffleError::NotFound => ErrorKind::NotFound,
            RaffleError::ProviderUnavailable(_)
            | RaffleError::ProviderRateLimited { .. }
            | RaffleError::AuthenticationFailure(_) => ErrorKind::ServiceUnavailable,
            RaffleError::MethodNotAllowed => ErrorKind::MethodNotAllowed,
            RaffleError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Machine-readable code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            RaffleError::RateLimited { .. } => "rate_limited",
            RaffleError::InvalidRequest(_) => "invalid_request",
            RaffleError::InvalidReference(_) => "invalid_reference",
            RaffleError::NotFound => "not_found",
            RaffleError::ProviderUnavailable(_) => "provider_unavailable",
            RaffleError::ProviderRateLimited { .. } => "provider_rate_limited",
            RaffleError::AuthenticationFailure(_) => "authentication_failure",
            RaffleError::MethodNotAllowed => "method_not_allowed",
            RaffleError::Internal(_) => "internal",
        }
    }

    /// Message safe to show the caller
    ///
    /// Provider and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            RaffleError::ProviderUnavailable(_) => "Content provider unavailable".to_string(),
            RaffleError::AuthenticationFailure(_) => {
                "Content provider authentication failed".to_string()
            }
            RaffleError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RaffleError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            RaffleError::ProviderRateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub(crate) fn log(&self) {
        match self {
            RaffleError::AuthenticationFailure(msg) => {
                tracing::error!(
                    code = self.code(),
                    message = %msg,
                    "Provider authentication failed"
                );
            }
            RaffleError::Internal(msg) => {
                tracing::error!(code = self.code(), message = %msg, "Raffle internal error");
            }
            RaffleError::ProviderUnavailable(msg) => {
                tracing::error!(code = self.code(), message = %msg, "Provider unavailable");
            }
            RaffleError::RateLimited { .. } | RaffleError::ProviderRateLimited { .. } => {
                tracing::warn!(code = self.code(), error = %self, "Request throttled");
            }
            _ => {
                tracing::debug!(code = self.code(), error = %self, "Raffle request rejected");
            }
        }
    }
}

impl From<ProviderError> for RaffleError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials(msg) => RaffleError::AuthenticationFailure(msg),
            ProviderError::NotFound => RaffleError::NotFound,
            ProviderError::RateLimited { retry_after_secs } => {
                RaffleError::ProviderRateLimited { retry_after_secs }
            }
            ProviderError::Unauthorized => {
                RaffleError::ProviderUnavailable("session rejected after refresh".to_string())
            }
            ProviderError::Unavailable(msg) | ProviderError::Malformed(msg) => {
                RaffleError::ProviderUnavailable(msg)
            }
        }
    }
}

impl From<RaffleError> for AppError {
    fn from(err: RaffleError) -> Self {
        let mut app_error =
            AppError::new(err.kind(), err.public_message()).with_code(err.code());
        if let Some(secs) = err.retry_after_secs() {
            app_error = app_error.with_retry_after(secs);
        }
        app_error.with_source(err)
    }
}

impl IntoResponse for RaffleError {
    fn into_response(self) -> Response {
        self.log();
        AppError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_status_and_codes() {
        let cases = [
            (RaffleError::RateLimited { retry_after_secs: 5 }, 429, "rate_limited"),
            (
                RaffleError::InvalidRequest("Missing post_url in request body".into()),
                400,
                "invalid_request",
            ),
            (
                RaffleError::InvalidReference(PostReferenceError::MissingPostId),
                400,
                "invalid_reference",
            ),
            (RaffleError::NotFound, 404, "not_found"),
            (
                RaffleError::ProviderUnavailable("timeout".into()),
                503,
                "provider_unavailable",
            ),
            (
                RaffleError::ProviderRateLimited { retry_after_secs: None },
                503,
                "provider_rate_limited",
            ),
            (
                RaffleError::AuthenticationFailure("401".into()),
                503,
                "authentication_failure",
            ),
            (RaffleError::Internal("boom".into()), 500, "internal"),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code().as_u16(), status, "{err:?}");
            assert_eq!(err.kind().status_code(), status, "{err:?}");
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_provider_error_mapping() {
        assert!(matches!(
            RaffleError::from(ProviderError::InvalidCredentials("x".into())),
            RaffleError::AuthenticationFailure(_)
        ));
        assert!(matches!(
            RaffleError::from(ProviderError::NotFound),
            RaffleError::NotFound
        ));
        assert!(matches!(
            RaffleError::from(ProviderError::RateLimited { retry_after_secs: Some(3) }),
            RaffleError::ProviderRateLimited { retry_after_secs: Some(3) }
        ));
        assert!(matches!(
            RaffleError::from(ProviderError::Malformed("bad json".into())),
            RaffleError::ProviderUnavailable(_)
        ));
    }

    #[test]
    fn test_public_message_hides_details() {
        let err = RaffleError::ProviderUnavailable("connect error to 10.0.0.1".into());
        assert!(!err.public_message().contains("10.0.0.1"));
        let err = RaffleError::AuthenticationFailure("invalid_grant for client abc".into());
        assert!(!err.public_message().contains("abc"));
    }

    #[tokio::test]
    async fn test_into_response_body_and_retry_after() {
        let response = RaffleError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Rate limit exceeded");
        assert_eq!(json["code"], "rate_limited");
    }
}
