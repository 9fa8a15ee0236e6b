use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// In-process recurring jobs, at most one per name.
///
/// Registering a name that is already scheduled cancels the old job before
/// the new one starts, so a definition is replaced rather than duplicated.
/// Runs of one job never overlap: the next tick waits for the handler.
pub struct JobScheduler {
    jobs: Mutex<HashMap<String, CancellationToken>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run `handler(payload)` every `every`, first after one full interval.
    pub fn register<P, F, Fut>(&self, name: &str, every: Duration, payload: P, handler: F)
    where
        P: Clone + Send + Sync + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.cancel.child_token();
        let previous = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), token.clone());
        if let Some(previous) = previous {
            tracing::info!(job = %name, "replacing scheduled job");
            previous.cancel();
        }

        let job = name.to_string();
        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!(job = %job, "job cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        tracing::debug!(job = %job, "job tick");
                        handler(payload.clone()).await;
                    }
                }
            }
        });
        tracing::debug!(job = %name, every = %humantime::format_duration(every), "job registered");
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .is_some_and(|t| !t.is_cancelled())
    }

    /// Cancel one job. Returns false when no such job was scheduled.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = self
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name);
        match removed {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every job and wait for running handlers to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
