//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use changeflow_core::config::GatewayConfig;
use changeflow_engine::SchedulerEngine;

/// Shared state for the gateway server.
pub struct AppState {
    pub config: GatewayConfig,
    /// The scheduling engine — single authority over pending changes.
    pub engine: Arc<SchedulerEngine>,
    pub start_time: std::time::Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/schedule",
            post(super::routes::schedule_change).get(super::routes::list_scheduled_changes),
        )
        .route(
            "/schedule/{change_number}",
            get(super::routes::get_scheduled_change)
                .delete(super::routes::cancel_scheduled_change),
        )
        .route("/health", get(super::routes::health_check))
        .route(
            "/check-status/{change_number}",
            get(super::routes::force_check_status),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Bind and serve until a shutdown signal arrives.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutdown signal received");
    }
}
