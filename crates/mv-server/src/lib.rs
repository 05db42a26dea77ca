//! mv-server: HTTP API and background maintenance for mixvault.
//!
//! This crate ties the other mv-* crates into a running server:
//!
//! - Axum HTTP API with bearer authentication and request IDs
//! - Startup recovery of credit holds left behind by a crash
//! - Background sweeper enforcing artifact retention
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod sweeper;

use std::net::SocketAddr;

use mv_core::config::Config;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the mixvault server.
///
/// Opens the database, wires the blob store and export engine, releases
/// orphaned credit holds, then serves HTTP until a shutdown signal arrives.
pub async fn start(config: Config) -> mv_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db_path = &config.server.db_path;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy();
    let db = mv_db::pool::init_pool(&db_str)?;
    tracing::info!("Database opened at {db_str}");

    let blobs = mv_export::build_blob_store(&config.storage)?;
    tracing::info!(backend = blobs.name(), "Blob store ready");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| mv_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(db, config, blobs);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| mv_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    serve(ctx, listener, CancellationToken::new()).await
}

/// Serve `ctx` on an already-bound listener until a signal or `cancel`.
pub async fn serve(
    ctx: AppContext,
    listener: tokio::net::TcpListener,
    cancel: CancellationToken,
) -> mv_core::Result<()> {
    ctx.engine.artifacts().ensure_dir().await?;

    let released = ctx.engine.ledger().release_orphans().await?;
    if released > 0 {
        tracing::warn!(released, "Released orphaned credit reservations");
    }

    let sweeper_handle = tokio::spawn(sweeper::run_sweeper(ctx.clone(), cancel.clone()));

    let app = router::build_router(ctx);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    let _ = sweeper_handle.await;

    result.map_err(|e| mv_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
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
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
