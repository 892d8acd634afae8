use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use super::routes::build_router;
use super::state::ApiState;
use crate::errors::{GatewayError, Result};

/// Interval between attempts to flush parked audit events.
const AUDIT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Serve the API until Ctrl-C or SIGTERM.
pub async fn start_api_server(state: ApiState) -> Result<()> {
    let addr: SocketAddr = state
        .config
        .server
        .bind_address()
        .parse()
        .map_err(|e| GatewayError::config(format!("Invalid API address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::internal(format!("Failed to bind API server: {}", e)))?;

    let pruner = state.rate_limiter.spawn_pruner(state.config.rate_limit.prune_interval());
    let flusher = spawn_audit_flusher(&state);
    let router = build_router(state.clone());

    info!(address = %addr, "Starting HTTP API server");
    let served = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::internal(format!("API server error: {}", e)));

    pruner.abort();
    flusher.abort();

    let parked = state.auditor.flush_backlog().await;
    if parked > 0 {
        warn!(parked, "Audit events still parked at shutdown");
    }

    info!("API server shutdown completed");
    served
}

fn spawn_audit_flusher(state: &ApiState) -> tokio::task::JoinHandle<()> {
    let auditor = state.auditor.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(AUDIT_FLUSH_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if auditor.backlog_len().await > 0 {
                let remaining = auditor.flush_backlog().await;
                info!(remaining, "Flushed parked audit events");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "API server shutdown listener failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM listener failed");
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
    info!("Shutdown signal received");
}
