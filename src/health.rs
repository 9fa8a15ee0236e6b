use std::time::Duration;

use crate::config::model::HealthSettings;

/// Join a health path onto a base URL without doubling or dropping slashes.
pub fn join_health_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        format!("{}/", base)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Single-shot HTTP liveness probe. Never retries; callers that want to wait
/// for readiness poll it themselves.
#[derive(Clone)]
pub struct HealthMonitor {
    client: reqwest::Client,
    path: String,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(settings: &HealthSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            path: settings.path.clone(),
            timeout: settings.timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `url` + the configured health path (or `path_override`).
    pub async fn probe(&self, url: &str, path_override: Option<&str>) -> bool {
        let target = join_health_url(url, path_override.unwrap_or(&self.path));
        self.check_health(&target, self.timeout).await
    }

    /// GET `url`; true only for a 2xx answer within `timeout`. Network
    /// errors, other statuses and timeouts all read as unhealthy.
    pub async fn check_health(&self, url: &str, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => true,
            Ok(Ok(response)) => {
                tracing::debug!(url = %url, status = %response.status(), "health check: bad status");
                false
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %url, "health check failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!(url = %url, "health check timed out after {:?}", timeout);
                false
            }
        }
    }
}
