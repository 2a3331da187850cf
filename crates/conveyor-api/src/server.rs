//! Gateway server

use std::net::SocketAddr;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Error;

/// Default listen address of the gateway
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Serve `router` on `addr` until `shutdown` is cancelled
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("failed to bind {}: {}", addr, e)))?;

    info!(addr = %addr, "Starting HTTP gateway");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

    info!("HTTP gateway stopped");
    Ok(())
}
