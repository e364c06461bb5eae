//! Analytics Console - local orchestration service for the analytics wizard
//!
//! Drives each analysis session through query, ambiguity resolution,
//! context confirmation and processing against the analytics backend, and
//! exposes the sessions to a UI over HTTP and SSE.

mod api;
mod backend;
mod config;
mod runtime;
mod session;
mod state_machine;

use api::{create_router, AppState};
use backend::{AnalyticsBackend, HttpBackend};
use config::Config;
use runtime::RuntimeManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "analytics_console=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        backend = %config.backend_url,
        status_poll_ms = config.polling.status_interval.as_millis(),
        log_poll_ms = config.polling.log_interval.as_millis(),
        max_poll_failures = config.polling.max_failures,
        "Configuration loaded"
    );

    let backend = Arc::new(HttpBackend::new(
        config.backend_url.clone(),
        config.request_timeout,
    )?);

    // Login failures are not fatal; the UI can log in through the API
    if let Some((email, password)) = config.credentials() {
        match backend.login(email, password).await {
            Ok(user) => tracing::info!(user_id = %user.id, "Logged in to analytics backend"),
            Err(e) => tracing::warn!(error = %e, "Startup login failed"),
        }
    } else {
        tracing::warn!("No credentials configured. Set ANALYTICS_EMAIL and ANALYTICS_PASSWORD.");
    }

    let manager = RuntimeManager::new(backend, config.polling);
    if let Err(e) = manager.list_sessions(None).await {
        tracing::warn!(error = %e, "Could not load sessions at startup");
    }

    let state = AppState::new(manager);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Analytics console listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
