use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Credential vs. Authorization Errors
///
/// Every credential problem (wrong scheme, malformed token, unknown or
/// expired token) collapses into `InvalidAuthenticationToken` so callers
/// cannot tell them apart. Authorization failures concern a principal that
/// is already identified, so each cause keeps its own variant:
///
/// - `AuthenticationRequired` - anonymous principal on a guarded route
/// - `InactiveAccount` - authenticated but not activated
/// - `NotPermitted` - activated but missing the required permission code
#[derive(Error, Debug)]
pub enum AppError {
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        /// Whole seconds until the client's next request would be admitted.
        retry_after_secs: u64,
    },

    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("account not activated")]
    InactiveAccount,

    #[error("not permitted")]
    NotPermitted,

    #[error("Resource not found")]
    NotFound,

    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error envelope written on every failure path: `{"error": "<message>"}`.
#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a str,
}

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

impl AppError {
    /// Status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidAuthenticationToken | AppError::AuthenticationRequired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InactiveAccount | AppError::NotPermitted => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Never includes server-side details.
    pub fn public_message(&self) -> String {
        match self {
            AppError::RateLimitExceeded { .. } => "rate limit exceeded".to_string(),
            AppError::InvalidAuthenticationToken => {
                "invalid or missing authentication token".to_string()
            }
            AppError::AuthenticationRequired => {
                "you must be authenticated to access this resource".to_string()
            }
            AppError::InactiveAccount => {
                "your user account must be activated to access this resource".to_string()
            }
            AppError::NotPermitted => {
                "your user account doesn't have the necessary permissions to access this resource"
                    .to_string()
            }
            AppError::NotFound => "the requested resource could not be found".to_string(),
            AppError::MethodNotAllowed(method) => {
                format!("the {method} method is not supported for this resource")
            }
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Internal(_) | AppError::ConfigError(_) => SERVER_ERROR_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server errors carry details for the log only
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let message = self.public_message();
        let mut response = (status, axum::Json(ErrorEnvelope { error: &message })).into_response();

        match self {
            AppError::InvalidAuthenticationToken => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            AppError::RateLimitExceeded { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            _ => {}
        }

        response
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
