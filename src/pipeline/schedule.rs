//! Timer-driven scan scheduling.
//!
//! A recurring interval triggers cycles; missed ticks are skipped, not
//! queued, so a slow site can never build up a backlog of pending
//! cycles. Shutdown flips the shared watch channel, which both stops
//! this loop and cancels an in-flight cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::models::CycleSummary;
use crate::pipeline::Orchestrator;

/// Run cycles on the configured interval until shutdown.
pub async fn run_scheduler(
    orchestrator: Arc<Orchestrator>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let minutes = orchestrator.config().general.scan_interval_minutes;
    let mut interval = tokio::time::interval(Duration::from_secs(minutes * 60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut shutdown_rx = shutdown.clone();
    log::info!("Scheduler started, scanning every {minutes} minute(s)");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match orchestrator.run_cycle(&shutdown).await {
                    Ok(Some(summary)) => log_summary(&summary),
                    Ok(None) => {}
                    Err(e) => log::error!("Scan cycle failed: {e}"),
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    log::info!("Scheduler stopped");
    Ok(())
}

/// Log a human-readable cycle summary.
pub fn log_summary(summary: &CycleSummary) {
    log::info!(
        "Cycle done in {}ms: {} new, {} updated, {} removed{}{}",
        summary.duration_ms,
        summary.new,
        summary.updated,
        summary.removed,
        if summary.undelivered > 0 {
            format!(", {} UNDELIVERED", summary.undelivered)
        } else {
            String::new()
        },
        if summary.cancelled { " (cancelled)" } else { "" },
    );

    for source in &summary.sources {
        match &source.error {
            None => log::info!(
                "  {}: ok ({} new, {} updated, {} removed, {} rejected, {}ms)",
                source.source_id,
                source.new,
                source.updated,
                source.removed,
                source.rejected,
                source.duration_ms
            ),
            Some(error) => log::warn!("  {}: FAILED: {error}", source.source_id),
        }
    }
}
