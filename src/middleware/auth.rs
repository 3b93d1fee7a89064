//! Bearer token authentication stage.
//!
//! Attaches exactly one [`Principal`] to every request that passes through:
//!
//! ```text
//!   no or empty Authorization      ──► Principal::Anonymous, continue
//!   "Bearer <token>", token known  ──► Principal::Authenticated(user), continue
//!   anything else                  ──► 401 invalid or missing authentication token
//!   lookup backend failure         ──► 500
//! ```
//!
//! A wrong scheme, a malformed token, and an unknown or expired token all
//! produce the same response, so callers cannot tell which tokens exist.
//! Every response, including rejections, carries `Vary: Authorization`.
//!
//! # Credential Handling
//!
//! The token is never logged. It is validated structurally (26 base32
//! characters) before it reaches the [`UserLookup`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, header};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, error};

use crate::error::{AppError, AppResult};
use crate::lookup::{LookupError, UserLookup};
use crate::models::{Principal, TokenScope};
use crate::validation::validate_token_plaintext;

/// Authorization scheme accepted by this stage.
pub const BEARER_SCHEME: &str = "Bearer";

/// Authentication layer resolving bearer tokens through a [`UserLookup`].
#[derive(Clone)]
pub struct AuthenticateLayer {
    users: Arc<dyn UserLookup>,
}

impl AuthenticateLayer {
    pub fn new(users: Arc<dyn UserLookup>) -> Self {
        Self { users }
    }
}

impl<S> Layer<S> for AuthenticateLayer {
    type Service = AuthenticateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticateService {
            inner,
            users: self.users.clone(),
        }
    }
}

/// Authentication service wrapper.
#[derive(Clone)]
pub struct AuthenticateService<S> {
    inner: S,
    users: Arc<dyn UserLookup>,
}

impl<S> Service<Request<Body>> for AuthenticateService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let users = self.users.clone();
        let mut inner = self.inner.clone();
        let authorization = req.headers().get(header::AUTHORIZATION).cloned();

        Box::pin(async move {
            let mut response = match resolve_principal(authorization.as_ref(), users.as_ref()).await {
                Ok(principal) => {
                    req.extensions_mut().insert(principal);
                    inner.call(req).await?
                }
                Err(e) => e.into_response(),
            };

            response
                .headers_mut()
                .append(header::VARY, HeaderValue::from_static("Authorization"));
            Ok(response)
        })
    }
}

/// Determine the principal from the `Authorization` header value.
async fn resolve_principal(
    authorization: Option<&HeaderValue>,
    users: &dyn UserLookup,
) -> AppResult<Principal> {
    let Some(value) = authorization.filter(|value| !value.is_empty()) else {
        debug!("No credentials, continuing as anonymous");
        return Ok(Principal::Anonymous);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or(AppError::InvalidAuthenticationToken)?;

    validate_token_plaintext(token).map_err(|_| AppError::InvalidAuthenticationToken)?;

    match users.get_for_token(TokenScope::Authentication, token).await {
        Ok(user) => {
            debug!(user_id = user.id, "Request authenticated");
            Ok(Principal::Authenticated(user))
        }
        Err(LookupError::NotFound) => Err(AppError::InvalidAuthenticationToken),
        Err(e @ LookupError::Backend(_)) => {
            error!(error = %e, "User lookup failed during authentication");
            Err(AppError::Internal(e.to_string()))
        }
    }
}

/// Extract the token from `"Bearer <token>"`.
///
/// The header must split on a single space into exactly two parts.
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) => Some(token),
        _ => None,
    }
}
