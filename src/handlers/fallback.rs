use axum::http::Method;

use crate::error::AppError;

/// Response for paths no route matches.
pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// Response for a matched path with an unsupported method.
pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}
