//! HTTP API server.
//!
//! Axum router exposing `POST /generate_speech` and `GET /health`.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{config::ServiceConfig, service::SpeechService};

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod state;

/// Bind the configured address and serve until Ctrl-C / SIGTERM, then let
/// in-flight requests finish.
pub async fn serve(config: &ServiceConfig, service: SpeechService) -> Result<()> {
    if !config.auth.is_enabled() {
        warn!("no credentials configured, /generate_speech is unauthenticated");
    }

    let (host, port) = config.bind_addr();
    let app = routes::create_router(state::AppState::new(service, config.auth.clone()));

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Cannot bind {}:{}", host, port))?;
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining requests");
}
