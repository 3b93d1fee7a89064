use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::TimeDelta;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use greenlight::metrics::try_init_metrics;
use greenlight::models::TokenScope;
use greenlight::routes::{MOVIES_READ, MOVIES_WRITE};
use greenlight::{AppState, Config, MemoryStore, build_router, utils};

/// Lifetime of the seeded demo token.
const DEMO_TOKEN_TTL_DAYS: i64 = 365;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Greenlight v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        environment = %config.environment,
        limiter_enabled = config.limiter_enabled,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    if let Some(token) = config.demo_auth_token.as_deref() {
        seed_demo_user(&store, token).await.map_err(|e| {
            error!("Failed to seed demo user: {e}");
            exitcode::CONFIG
        })?;
    } else {
        warn!("DEMO_AUTH_TOKEN not set, no user can authenticate");
    }

    if let Some(metrics_addr) = config.metrics_addr() {
        try_init_metrics(metrics_addr);
    }

    // Build application state and router
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let state = AppState::new(config, store.clone(), store);
    let app = build_router(state.clone());

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /v1/healthcheck   - Health check");
    info!("  GET  /debug/vars       - Request counters");
    info!("  GET  /v1/users/me      - Current user (activated)");
    info!("  GET  /v1/movies/{{id}}   - Show movie ({MOVIES_READ})");
    info!("  POST /v1/movies        - Create movie ({MOVIES_WRITE})");

    // Start server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    // Gracefully shutdown background tasks
    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Register an activated demo user owning `token` with both movie permissions.
async fn seed_demo_user(
    store: &MemoryStore,
    token: &str,
) -> Result<(), greenlight::lookup::LookupError> {
    let user = store
        .insert_user("Demo User", "demo@example.com", true)
        .await;
    store
        .insert_token_plaintext(
            user.id,
            token,
            TimeDelta::days(DEMO_TOKEN_TTL_DAYS),
            TokenScope::Authentication,
        )
        .await?;
    store
        .add_permissions_for_user(user.id, [MOVIES_READ, MOVIES_WRITE])
        .await;

    info!(user_id = user.id, "Demo user seeded");
    Ok(())
}
