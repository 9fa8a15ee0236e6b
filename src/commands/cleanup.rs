use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use super::connect;
use crate::cleanup::{CleanupController, JobScheduler, CLEANUP_JOB};
use crate::ui::summary::print_cleanup_report;

pub async fn run(config_file: Option<&Path>, threshold: Option<u64>, watch: bool) -> Result<()> {
    let orchestrator = Arc::new(connect(config_file)?);
    let threshold = threshold.unwrap_or(orchestrator.settings().cleanup.threshold_minutes);
    let controller = Arc::new(CleanupController::new(
        orchestrator.sessions(),
        orchestrator.clone(),
    ));

    if !watch {
        let report = controller.cleanup_inactive(threshold).await?;
        print_cleanup_report(&report);
        return Ok(());
    }

    let every = orchestrator.settings().cleanup.interval()?;
    let scheduler = JobScheduler::new();
    scheduler.register(CLEANUP_JOB, every, threshold, move |threshold| {
        let controller = controller.clone();
        async move {
            match controller.cleanup_inactive(threshold).await {
                Ok(report) => tracing::info!(
                    cleaned = report.cleaned,
                    skipped = report.skipped,
                    already_stopped = report.already_stopped,
                    failed = report.failed,
                    "cleanup run finished"
                ),
                Err(e) => tracing::warn!("cleanup run failed: {}", e),
            }
        }
    });
    tracing::info!(
        every = %humantime::format_duration(every),
        threshold_minutes = threshold,
        "watching for idle previews, Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    scheduler.shutdown().await;
    Ok(())
}
