//! Operational endpoints.
//!
//! # Endpoints
//!
//! - `GET /v1/healthcheck` - Liveness and build information
//! - `GET /debug/vars` - Request metrics snapshot, like Go's expvar page
//!
//! Both are public: they sit behind the guard stages but no authorization gate.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{DebugVarsResponse, HealthResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "available",
///   "environment": "development",
///   "version": "0.1.0"
/// }
/// ```
#[instrument(skip(state))]
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        environment: state.config.environment.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Request metrics snapshot.
///
/// Counts include the request being served: it is recorded as received
/// before the handler runs, but its response is not yet recorded.
#[instrument(skip(state))]
pub async fn debug_vars(State(state): State<AppState>) -> Json<DebugVarsResponse> {
    let snapshot = state.metrics.snapshot();

    Json(DebugVarsResponse {
        total_requests_received: snapshot.requests_received,
        total_responses_sent: snapshot.responses_sent,
        total_processing_time_us: snapshot.processing_time_us,
        total_responses_sent_by_status: snapshot
            .responses_by_status
            .into_iter()
            .map(|(status, count)| (status.to_string(), count))
            .collect(),
        rate_limit_rejections: snapshot.rate_limit_rejections,
        tracked_clients: state.clients.len(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}
