//! # Greenlight
//!
//! An HTTP guard pipeline for a JSON API, built on Axum and Tower:
//!
//! - **Rate Limiting**: per-client `governor` limiters with an idle-entry sweeper
//! - **Panic Containment**: a panicking handler becomes a JSON 500
//! - **Authentication**: bearer tokens resolved through an injected lookup
//! - **Authorization**: authenticated, activated and permission gates per route
//! - **CORS**: exact-match trusted origins with preflight answers
//! - **Observability**: request counters, `/debug/vars`, optional Prometheus
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (Metrics → Recover → Rate Limit → CORS → Auth)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Route gates (authenticated / activated / permission)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (healthcheck, debug vars, users, movies)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Lookups (UserLookup, PermissionLookup → MemoryStore)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! use greenlight::{AppState, Config, MemoryStore, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(MemoryStore::new());
//!
//!     let state = AppState::new(config, store.clone(), store);
//!     let app = build_router(state.clone());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:4000").await?;
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! The rate limiter keys clients by peer address, so the router must be
//! served with connect info.
//!
//! ## Configuration
//!
//! Tune the limiter:
//! ```bash
//! LIMITER_RPS=10 LIMITER_BURST=20 cargo run
//! ```
//!
//! Allow a browser frontend:
//! ```bash
//! CORS_TRUSTED_ORIGINS="https://app.example.com" cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod lookup;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::{build_router, with_pipeline};
pub use state::AppState;
pub use store::MemoryStore;
