//! Guard stages wrapping the resource handlers.
//!
//! Every stage is a Tower `Layer`/`Service` pair that either writes a terminal
//! response or passes the request on untouched:
//!
//! - **Metrics**: request/response counters and latency
//! - **Panic containment**: a panic below becomes a JSON 500 with `Connection: close`
//! - **Rate limiting**: per-client `governor` limiters in a shared [`ClientTable`](crate::limiter::ClientTable)
//! - **CORS**: trusted-origin reflection and preflight answers
//! - **Authentication**: bearer token to [`Principal`](crate::models::Principal)
//! - **Authorization**: per-route authenticated / activated / permission gates
//!
//! # Architecture
//!
//! ```text
//! Request → Metrics → Recover → Rate Limit → CORS → Authenticate → Authorize → Handler
//!              ↓         ↓           ↓          ↓          ↓             ↓
//!          counters     500         429     preflight     401       401 / 403
//! ```
//!
//! The order is fixed by [`routes::with_pipeline`](crate::routes::with_pipeline).

pub mod auth;
pub mod authorize;
pub mod cors;
pub mod ip;
pub mod metrics;
pub mod rate_limit;
pub mod recover;

pub use auth::AuthenticateLayer;
pub use authorize::AuthorizeLayer;
pub use cors::CorsLayer;
pub use ip::{ClientIdentityResolver, IdentityError, TrustedProxyConfig};
pub use metrics::MetricsLayer;
pub use rate_limit::RateLimitLayer;
pub use recover::{RecoverPanicLayer, handle_panic, recover_panic_layer};
