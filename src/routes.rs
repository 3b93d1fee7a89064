//! Application routing and guard pipeline.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Metrics      │ ← counts every request and the status actually sent
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Panic Recovery   │ ← 500 + Connection: close on panic
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client is over its quota
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← trusted origins, preflight answers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← 401 if the bearer token is invalid
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authorization   │ ← per route: 401 / 403
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! | Method | Path               | Gate                |
//! |--------|--------------------|---------------------|
//! | GET    | `/v1/healthcheck`  | none                |
//! | GET    | `/debug/vars`      | none                |
//! | GET    | `/v1/users/me`     | activated user      |
//! | GET    | `/v1/movies/{id}`  | `movies:read`       |
//! | POST   | `/v1/movies`       | `movies:write`      |

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{
    AuthenticateLayer, AuthorizeLayer, ClientIdentityResolver, CorsLayer, MetricsLayer,
    RateLimitLayer, TrustedProxyConfig, recover_panic_layer,
};
use crate::state::AppState;

/// Permission required to read movies.
pub const MOVIES_READ: &str = "movies:read";

/// Permission required to create movies.
pub const MOVIES_WRITE: &str = "movies:write";

/// Build the application router with all routes and the guard pipeline.
pub fn build_router(state: AppState) -> Router {
    let routes = api_routes(&state);
    with_pipeline(routes, state)
}

/// The resource routes, each with its authorization gate.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let permissions = state.permissions.clone();

    Router::new()
        // Public
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route("/debug/vars", get(handlers::debug_vars))
        // Activated users
        .route(
            "/v1/users/me",
            get(handlers::show_current_user).route_layer(AuthorizeLayer::activated()),
        )
        // Permission gated
        .route(
            "/v1/movies/{id}",
            get(handlers::show_movie)
                .route_layer(AuthorizeLayer::permission(MOVIES_READ, permissions.clone())),
        )
        .route(
            "/v1/movies",
            post(handlers::create_movie)
                .route_layer(AuthorizeLayer::permission(MOVIES_WRITE, permissions)),
        )
}

/// Wrap `routes` in the full guard pipeline and attach `state`.
///
/// Unmatched paths answer 404 and unsupported methods 405, both as JSON
/// errors that still pass through every stage.
pub fn with_pipeline(routes: Router<AppState>, state: AppState) -> Router {
    let config = state.config.clone();

    let rate_limit = if config.limiter_enabled {
        info!(
            rps = config.limiter_rps,
            burst = config.limiter_burst,
            client_ip_source = %config.client_ip_source,
            trusted_proxies = config.trusted_proxies.len(),
            "Rate limiting enabled"
        );
        RateLimitLayer::new(
            state.clients.clone(),
            ClientIdentityResolver::new(
                config.client_ip_source,
                TrustedProxyConfig::new(&config.trusted_proxies),
            ),
            state.metrics.clone(),
        )
    } else {
        info!("Rate limiting disabled (LIMITER_ENABLED=false)");
        RateLimitLayer::disabled()
    };

    if config.cors_trusted_origins.is_empty() {
        info!("No CORS trusted origins configured");
    } else {
        info!(origins = ?config.cors_trusted_origins, "CORS trusted origins configured");
    }

    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );

    // Layers added later wrap the ones before, so this reads innermost first
    routes
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(AuthenticateLayer::new(state.users.clone()))
        .layer(CorsLayer::new(config.cors_trusted_origins.clone()))
        .layer(rate_limit)
        .layer(recover_panic_layer())
        .layer(MetricsLayer::new(state.metrics.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
