pub mod scheduler;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::orchestrator::PreviewStopper;
use crate::session::SessionStore;

pub use scheduler::JobScheduler;

/// Job name the periodic cleanup is registered under.
pub const CLEANUP_JOB: &str = "preview-cleanup";

/// Per-run tally of [`CleanupController::cleanup_inactive`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Had at least one running container and was stopped.
    pub cleaned: usize,
    /// Became active again between the scan and the stop.
    pub skipped: usize,
    /// Idle but with nothing left running, usually stopped by an earlier run.
    pub already_stopped: usize,
    pub failed: usize,
}

/// Stops previews whose sessions have been idle for too long.
pub struct CleanupController {
    sessions: Arc<dyn SessionStore>,
    stopper: Arc<dyn PreviewStopper>,
}

impl CleanupController {
    pub fn new(sessions: Arc<dyn SessionStore>, stopper: Arc<dyn PreviewStopper>) -> Self {
        Self { sessions, stopper }
    }

    /// Stop every preview idle for longer than `threshold_minutes`.
    ///
    /// Each candidate's activity is read again right before it is stopped,
    /// and sessions touched since the scan are skipped. Failures are counted
    /// and logged per session; only a failure to scan at all is an error.
    pub async fn cleanup_inactive(&self, threshold_minutes: u64) -> Result<CleanupReport> {
        let cutoff = i64::try_from(threshold_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let candidates = self.sessions.list_inactive(cutoff).await?;
        tracing::debug!(candidates = candidates.len(), %cutoff, "cleanup scan");

        let mut report = CleanupReport::default();
        for record in candidates {
            let key = match record.key() {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(project = %record.project_id, session = %record.session_id, "skipping malformed session: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            match self.sessions.last_activity(&key).await {
                Ok(Some(last)) if last < cutoff => {}
                Ok(_) => {
                    tracing::debug!(preview = %key, "session active again, not stopping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(preview = %key, "could not re-read activity: {}", e);
                    report.failed += 1;
                    continue;
                }
            }

            match self.stopper.stop_preview(&key).await {
                Ok(true) => {
                    tracing::info!(preview = %key, "stopped inactive preview");
                    report.cleaned += 1;
                }
                Ok(false) => {
                    tracing::debug!(preview = %key, "inactive preview already stopped");
                    report.already_stopped += 1;
                }
                Err(e) => {
                    tracing::warn!(preview = %key, "failed to stop inactive preview: {}", e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
