//! HTTP API server bootstrap: binds the configured address and serves
//! [`crate::api::routes::build_router`] until a shutdown signal fires.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::routes::build_router;
use crate::api::state::AppState;
use crate::config::settings::ServerConfig;
use crate::errors::{MarchProxyError, Result};

/// Binds and serves the API until `shutdown` resolves. The caller owns the
/// shutdown signal so the API server and the background tasks in
/// [`crate::startup::BackgroundTasks`] stop on the same trigger.
pub async fn start_api_server(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| MarchProxyError::config(format!("invalid API bind address: {e}")))?;

    let router: Router = build_router(state, config);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| MarchProxyError::Io { source: e, context: format!("failed to bind API server to {addr}") })?;

    info!(address = %addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| MarchProxyError::Io { source: e, context: "API server error".to_string() })?;

    info!("API server shut down");
    Ok(())
}
