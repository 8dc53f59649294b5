use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{config::ServerConfig, db::Database, handlers};

/// Serve the health endpoints until SIGTERM or Ctrl-C
pub async fn start_server(config: &ServerConfig, db: Database) -> Result<()> {
    let app = create_router(handlers::AppState { db: db.clone() });

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting Olympus on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: handlers::AppState) -> Router {
    Router::new()
        .route("/health/", get(handlers::health::health_check))
        .route("/health/db/", get(handlers::health::db_health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler, relying on Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
        _ = tokio::signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl-C received, initiating graceful shutdown");
}
