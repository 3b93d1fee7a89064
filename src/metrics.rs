//! Request metrics for application observability.
//!
//! Counters are held in an explicit [`RequestMetrics`] component owned by
//! `AppState`, so they can be read back (`/debug/vars`, tests) without a
//! global registry. Every update is mirrored to the `metrics` facade, which is
//! exported for Prometheus when an exporter is installed.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `greenlight_requests_received_total` - Requests that entered the pipeline
//! - `greenlight_responses_sent_total` - Responses that left the pipeline
//! - `greenlight_processing_time_us_total` - Cumulative processing time in microseconds
//! - `greenlight_responses_by_status_total` - Responses by status code (label: status)
//! - `greenlight_rate_limit_rejections_total` - Requests rejected by the rate limiter
//!
//! ## Histograms
//! - `greenlight_request_duration_seconds` - Request duration (labels: method, status)
//!
//! ## Gauges
//! - `greenlight_tracked_clients` - Client identities held by the rate limiter
//!
//! # Usage
//!
//! ```rust,ignore
//! use greenlight::metrics::{RequestMetrics, try_init_metrics};
//!
//! // Install the exporter once at startup (optional)
//! try_init_metrics("0.0.0.0:9090".parse()?);
//!
//! let metrics = RequestMetrics::new();
//! metrics.record_request_received();
//! metrics.record_response("GET", 200, elapsed);
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_RECEIVED_TOTAL: &str = "greenlight_requests_received_total";
    pub const RESPONSES_SENT_TOTAL: &str = "greenlight_responses_sent_total";
    pub const PROCESSING_TIME_US_TOTAL: &str = "greenlight_processing_time_us_total";
    pub const RESPONSES_BY_STATUS_TOTAL: &str = "greenlight_responses_by_status_total";
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "greenlight_rate_limit_rejections_total";
    pub const REQUEST_DURATION_SECONDS: &str = "greenlight_request_duration_seconds";
    pub const TRACKED_CLIENTS: &str = "greenlight_tracked_clients";
}

/// Initialize the Prometheus metrics exporter.
///
/// This sets up metric descriptions and starts the Prometheus HTTP listener
/// on the specified address.
///
/// # Returns
///
/// `Ok(())` if initialization succeeds, `Err` with message otherwise.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_RECEIVED_TOTAL,
        "Total number of requests received"
    );
    describe_counter!(
        names::RESPONSES_SENT_TOTAL,
        "Total number of responses sent"
    );
    describe_counter!(
        names::PROCESSING_TIME_US_TOTAL,
        "Cumulative request processing time in microseconds"
    );
    describe_counter!(
        names::RESPONSES_BY_STATUS_TOTAL,
        "Total number of responses sent by status code"
    );
    describe_counter!(
        names::RATE_LIMIT_REJECTIONS_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );

    describe_gauge!(
        names::TRACKED_CLIENTS,
        "Number of client identities tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
///
/// This is useful for cases where metrics are optional.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Update the tracked clients gauge.
pub fn set_tracked_clients(count: usize) {
    gauge!(names::TRACKED_CLIENTS).set(count as f64);
}

/// Point-in-time copy of [`RequestMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_received: u64,
    pub responses_sent: u64,
    pub processing_time_us: u64,
    pub responses_by_status: BTreeMap<u16, u64>,
    pub rate_limit_rejections: u64,
}

/// Process-wide request counters maintained by the metrics stage.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    rate_limit_rejections: AtomicU64,
    responses_by_status: Mutex<BTreeMap<u16, u64>>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request entering the pipeline.
    pub fn record_request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        counter!(names::REQUESTS_RECEIVED_TOTAL).increment(1);
    }

    /// Count a response leaving the pipeline with the status actually written.
    pub fn record_response(&self, method: &str, status: u16, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        // Per-status count first so responses_sent never runs ahead of the map
        *self
            .responses_by_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(status)
            .or_insert(0) += 1;
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_us.fetch_add(micros, Ordering::Relaxed);

        let status_label = status.to_string();
        counter!(names::RESPONSES_SENT_TOTAL).increment(1);
        counter!(names::PROCESSING_TIME_US_TOTAL).increment(micros);
        counter!(names::RESPONSES_BY_STATUS_TOTAL, "status" => status_label.clone()).increment(1);
        histogram!(names::REQUEST_DURATION_SECONDS, "method" => method.to_string(), "status" => status_label)
            .record(elapsed.as_secs_f64());
    }

    /// Count a request rejected by the rate limiter.
    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejections.fetch_add(1, Ordering::Relaxed);
        counter!(names::RATE_LIMIT_REJECTIONS_TOTAL).increment(1);
    }

    pub fn requests_received(&self) -> u64 {
        self.requests_received.load(Ordering::Relaxed)
    }

    pub fn responses_sent(&self) -> u64 {
        self.responses_sent.load(Ordering::Relaxed)
    }

    pub fn rate_limit_rejections(&self) -> u64 {
        self.rate_limit_rejections.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let responses_by_status = self
            .responses_by_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        MetricsSnapshot {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
            responses_by_status,
            rate_limit_rejections: self.rate_limit_rejections.load(Ordering::Relaxed),
        }
    }
}
