use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "available" while the process serves requests
    pub status: String,
    /// Deployment environment label (e.g. "development", "production")
    pub environment: String,
    /// Application version
    pub version: String,
}

/// Snapshot of the request metrics, served on `/debug/vars`.
#[derive(Debug, Serialize)]
pub struct DebugVarsResponse {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_us: u64,
    /// Response count keyed by status code
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
    pub rate_limit_rejections: u64,
    /// Client identities currently held by the rate limiter
    pub tracked_clients: usize,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Placeholder movie resource returned by the sample movie routes.
#[derive(Debug, Serialize)]
pub struct Movie {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Runtime in minutes
    pub runtime: i32,
    pub genres: Vec<String>,
    pub version: i32,
}

/// `{"movie": ...}` envelope.
#[derive(Debug, Serialize)]
pub struct MovieEnvelope {
    pub movie: Movie,
}

/// `{"user": ...}` envelope.
#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: User,
}

/// Request body for creating a movie.
#[derive(Debug, Deserialize)]
pub struct CreateMovieRequest {
    pub title: String,
    pub year: i32,
    /// Runtime in minutes
    pub runtime: i32,
    #[serde(default)]
    pub genres: Vec<String>,
}
