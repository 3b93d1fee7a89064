//! Shared application state for Axum handlers and guard stages.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all requests. It includes:
//!
//! - **Collaborators**: [`UserLookup`] and [`PermissionLookup`] trait objects
//! - **Client table**: per-client limiters used by the rate limiter
//! - **Request metrics**: counters maintained by the metrics stage
//! - **Configuration**: Runtime configuration access
//!
//! # Structured Concurrency
//!
//! The client table's sweeper is the only background task. It is spawned
//! when the state is created (if the limiter is enabled) and stopped by
//! `shutdown()`, which must be awaited before application exit.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::limiter::{ClientTable, ClientTableConfig, Clock, SystemClock};
use crate::lookup::{PermissionLookup, UserLookup};
use crate::metrics::RequestMetrics;

/// Shared application state.
///
/// Cloned per request; every field is behind an `Arc`.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config, store.clone(), store);
/// // ... serve ...
/// state.shutdown().await;  // Stop the client sweeper
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Resolves bearer tokens to users
    pub users: Arc<dyn UserLookup>,
    /// Resolves a user's permission codes
    pub permissions: Arc<dyn PermissionLookup>,
    /// Rate limiter client registry
    pub clients: Arc<ClientTable>,
    /// Process-wide request counters
    pub metrics: Arc<RequestMetrics>,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    /// Create application state using the system clock.
    ///
    /// Must be called inside a Tokio runtime: the client sweeper is spawned
    /// here when rate limiting is enabled.
    pub fn new(
        config: Config,
        users: Arc<dyn UserLookup>,
        permissions: Arc<dyn PermissionLookup>,
    ) -> Self {
        Self::with_clock(config, users, permissions, Arc::new(SystemClock))
    }

    /// Create application state with an injected clock for the client table.
    pub fn with_clock(
        config: Config,
        users: Arc<dyn UserLookup>,
        permissions: Arc<dyn PermissionLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let clients = Arc::new(ClientTable::new(
            ClientTableConfig::from_config(&config),
            clock,
        ));

        if config.limiter_enabled {
            clients.spawn_sweeper();
            info!(
                sweep_interval_secs = config.limiter_sweep_interval.as_secs(),
                retention_secs = config.limiter_client_retention.as_secs(),
                "Client sweeper started"
            );
        }

        Self {
            config: Arc::new(config),
            users,
            permissions,
            clients,
            metrics: Arc::new(RequestMetrics::new()),
            started_at: Instant::now(),
        }
    }

    /// Gracefully shutdown all background tasks.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");
        self.clients.shutdown().await;
        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_shutdown_completes() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(Config::default(), store.clone(), store);

        assert!(state.clients.is_empty());
        assert_eq!(state.metrics.requests_received(), 0);

        tokio::time::timeout(Duration::from_secs(5), state.shutdown())
            .await
            .expect("shutdown should not hang");
    }

    #[tokio::test]
    async fn test_shutdown_with_limiter_disabled() {
        let store = Arc::new(MemoryStore::new());
        let config = Config {
            limiter_enabled: false,
            ..Config::default()
        };
        let state = AppState::new(config, store.clone(), store);

        tokio::time::timeout(Duration::from_secs(5), state.shutdown())
            .await
            .expect("shutdown should not hang");
    }
}
