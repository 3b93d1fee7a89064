//! Authorization gates applied per route.
//!
//! Each gate implies the ones before it, and the checks always run in this
//! order, so the first failing step decides the response:
//!
//! ```text
//!   Anonymous                             ──► 401 authentication required
//!   Authenticated, not activated          ──► 403 account not activated
//!   Activated, permission code missing    ──► 403 not permitted
//!   Activated, permission code present    ──► handler
//! ```
//!
//! Gates read the [`Principal`] attached by the authentication stage; a
//! request that reaches a gate without one is a wiring error and fails with
//! 500. Permission lookups happen per request through a [`PermissionLookup`];
//! a backend failure is a 500, never "no permissions".
//!
//! # Example
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/v1/movies", post(create_movie))
//!     .route_layer(AuthorizeLayer::permission("movies:write", state.permissions.clone()))
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, error};

use crate::error::{AppError, AppResult};
use crate::lookup::PermissionLookup;
use crate::models::{Principal, PrincipalExt, User};

/// What a gate demands of the principal.
#[derive(Clone)]
enum Requirement {
    Authenticated,
    Activated,
    Permission {
        code: Arc<str>,
        lookup: Arc<dyn PermissionLookup>,
    },
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Authenticated => write!(f, "Authenticated"),
            Requirement::Activated => write!(f, "Activated"),
            Requirement::Permission { code, .. } => write!(f, "Permission({code})"),
        }
    }
}

/// Route layer enforcing an authorization requirement.
#[derive(Clone, Debug)]
pub struct AuthorizeLayer {
    requirement: Requirement,
}

impl AuthorizeLayer {
    /// Reject anonymous principals.
    pub fn authenticated() -> Self {
        Self {
            requirement: Requirement::Authenticated,
        }
    }

    /// Reject anonymous principals and users that are not activated.
    pub fn activated() -> Self {
        Self {
            requirement: Requirement::Activated,
        }
    }

    /// Require an activated user holding the permission `code`.
    pub fn permission(code: impl Into<Arc<str>>, lookup: Arc<dyn PermissionLookup>) -> Self {
        Self {
            requirement: Requirement::Permission {
                code: code.into(),
                lookup,
            },
        }
    }
}

impl<S> Layer<S> for AuthorizeLayer {
    type Service = AuthorizeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeService {
            inner,
            requirement: self.requirement.clone(),
        }
    }
}

/// Authorization service wrapper.
#[derive(Clone)]
pub struct AuthorizeService<S> {
    inner: S,
    requirement: Requirement,
}

impl<S> Service<Request<Body>> for AuthorizeService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let requirement = self.requirement.clone();
        let mut inner = self.inner.clone();
        let principal = req.principal().cloned();

        Box::pin(async move {
            match authorize(principal, &requirement).await {
                Ok(()) => inner.call(req).await,
                Err(e) => {
                    debug!(
                        requirement = ?requirement,
                        path = %req.uri().path(),
                        "Authorization denied"
                    );
                    Ok(e.into_response())
                }
            }
        })
    }
}

/// Walk the gate sequence up to `requirement`.
async fn authorize(principal: Option<Principal>, requirement: &Requirement) -> AppResult<()> {
    let user = require_authenticated(principal)?;

    if matches!(requirement, Requirement::Authenticated) {
        return Ok(());
    }

    if !user.activated {
        return Err(AppError::InactiveAccount);
    }

    let Requirement::Permission { code, lookup } = requirement else {
        return Ok(());
    };

    let permissions = lookup.get_all_for_user(user.id).await.map_err(|e| {
        error!(error = %e, user_id = user.id, "Permission lookup failed");
        AppError::Internal(e.to_string())
    })?;

    if permissions.includes(code) {
        Ok(())
    } else {
        Err(AppError::NotPermitted)
    }
}

fn require_authenticated(principal: Option<Principal>) -> AppResult<User> {
    match principal {
        Some(Principal::Authenticated(user)) => Ok(user),
        Some(Principal::Anonymous) => Err(AppError::AuthenticationRequired),
        None => Err(AppError::Internal(
            "authorization gate reached without an authenticated principal".to_string(),
        )),
    }
}
