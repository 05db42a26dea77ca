//! Background retention sweeper for export artifacts.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Periodically delete expired artifacts until `cancel` fires.
///
/// Returns immediately when retention or the sweep interval is disabled.
pub async fn run_sweeper(ctx: AppContext, cancel: CancellationToken) {
    let export = &ctx.config.export;
    if export.artifact_ttl_secs == 0 || export.sweep_interval_secs == 0 {
        tracing::info!("Artifact sweeper disabled");
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(export.sweep_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(
        ttl_secs = export.artifact_ttl_secs,
        interval_secs = export.sweep_interval_secs,
        "Artifact sweeper started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = ctx.engine.sweep().await {
                    tracing::warn!(error = %e, "Artifact sweep failed");
                }
            }
        }
    }

    tracing::debug!("Artifact sweeper stopped");
}
