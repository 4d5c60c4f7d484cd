//! HTTP surface over the triage engine.

mod error;
mod handlers;
mod router;


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use logai_core::TriageEngine;
use tokio::sync::broadcast;
use tracing::info;

pub use error::ApiResult;
pub use router::build_api_router;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TriageEngine>,
    pub log_tx: broadcast::Sender<String>,
}

/// Bind and serve until the process receives Ctrl-C.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("API listening on http://{}", addr);

    let app = build_api_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down API server");
        })
        .await
        .context("API server stopped unexpectedly")
}
