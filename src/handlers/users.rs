use axum::Extension;
use axum::Json;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::models::{Principal, UserEnvelope};

/// Return the user the request was authenticated as.
///
/// Mounted behind the activated-user gate, so an anonymous principal only
/// reaches here if the route is wired without it.
#[instrument(skip(principal))]
pub async fn show_current_user(
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<UserEnvelope>> {
    match principal {
        Principal::Authenticated(user) => Ok(Json(UserEnvelope { user })),
        Principal::Anonymous => Err(AppError::AuthenticationRequired),
    }
}
