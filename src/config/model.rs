use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("router.port_range {start}-{end} is empty or inverted")]
    InvalidPortRange { start: u16, end: u16 },
    #[error("router.base_domain must not be empty")]
    EmptyBaseDomain,
    #[error("router.scheme must be http or https, got '{0}'")]
    InvalidScheme(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("cleanup.interval '{value}' is not a valid duration: {reason}")]
    InvalidInterval { value: String, reason: String },
    #[error("workspace.manifest must be a plain file name, got '{0}'")]
    InvalidManifestName(String),
}

/// Orchestrator settings, read from `previewrig.toml`.
///
/// Every section is optional; a missing file yields `Settings::default()`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub workspace: WorkspaceSettings,
    #[serde(default)]
    pub sessions: SessionSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub containers: ContainerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port_range() -> (u16, u16) {
    (20000, 20999)
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_entrypoints() -> String {
    "websecure".to_string()
}

/// How the entrypoint service is exposed. Picked once at construction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RouterSettings {
    /// Publish a host port from a bounded range.
    Port {
        #[serde(default = "default_host")]
        host: String,
        #[serde(default = "default_port_range")]
        port_range: (u16, u16),
    },
    /// Attach reverse-proxy labels; the proxy routes by hostname.
    Proxy {
        base_domain: String,
        #[serde(default = "default_scheme")]
        scheme: String,
        #[serde(default = "default_entrypoints")]
        entrypoints: String,
        #[serde(default)]
        cert_resolver: Option<String>,
        /// Network shared with the proxy container.
        #[serde(default)]
        network: Option<String>,
    },
}

impl Default for RouterSettings {
    fn default() -> Self {
        RouterSettings::Port {
            host: default_host(),
            port_range: default_port_range(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("previewrig")
        .join("sessions")
}

fn default_manifest() -> String {
    "preview.toml".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSettings {
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
    #[serde(default = "default_manifest")]
    pub manifest: String,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            manifest: default_manifest(),
        }
    }
}

fn default_sessions_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("previewrig")
        .join("sessions.json")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSettings {
    #[serde(default = "default_sessions_file")]
    pub file: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            file: default_sessions_file(),
        }
    }
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_health_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSettings {
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl HealthSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_stop_timeout_secs() -> u32 {
    10
}

fn default_app_dir() -> String {
    "/app".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerSettings {
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u32,
    /// Where a service's source directory is mounted inside its container.
    #[serde(default = "default_app_dir")]
    pub app_dir: String,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_stop_timeout_secs(),
            app_dir: default_app_dir(),
        }
    }
}

fn default_storage_secret() -> String {
    "previewrig".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    /// Mixed into derived storage passwords.
    #[serde(default = "default_storage_secret")]
    pub secret: String,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            secret: default_storage_secret(),
            ready_timeout_secs: default_ready_timeout_secs(),
        }
    }
}

fn default_threshold_minutes() -> u64 {
    30
}

fn default_interval() -> String {
    "5m".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupSettings {
    #[serde(default = "default_threshold_minutes")]
    pub threshold_minutes: u64,
    #[serde(default = "default_interval")]
    pub interval: String,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            threshold_minutes: default_threshold_minutes(),
            interval: default_interval(),
        }
    }
}

impl CleanupSettings {
    pub fn interval(&self) -> Result<Duration, SettingsError> {
        humantime::parse_duration(&self.interval).map_err(|e| SettingsError::InvalidInterval {
            value: self.interval.clone(),
            reason: e.to_string(),
        })
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        match &self.router {
            RouterSettings::Port { port_range, .. } => {
                let (start, end) = *port_range;
                if start == 0 || start > end {
                    return Err(SettingsError::InvalidPortRange { start, end });
                }
            }
            RouterSettings::Proxy {
                base_domain,
                scheme,
                ..
            } => {
                if base_domain.trim().is_empty() {
                    return Err(SettingsError::EmptyBaseDomain);
                }
                if scheme != "http" && scheme != "https" {
                    return Err(SettingsError::InvalidScheme(scheme.clone()));
                }
            }
        }
        let manifest = &self.workspace.manifest;
        if manifest.is_empty() || manifest.contains(['/', '\\']) || manifest == ".." {
            return Err(SettingsError::InvalidManifestName(manifest.clone()));
        }
        if self.health.timeout_ms == 0 {
            return Err(SettingsError::Zero("health.timeout_ms"));
        }
        if self.storage.ready_timeout_secs == 0 {
            return Err(SettingsError::Zero("storage.ready_timeout_secs"));
        }
        if self.cleanup.threshold_minutes == 0 {
            return Err(SettingsError::Zero("cleanup.threshold_minutes"));
        }
        if self.cleanup.interval()?.is_zero() {
            return Err(SettingsError::Zero("cleanup.interval"));
        }
        Ok(())
    }
}
