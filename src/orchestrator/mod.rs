pub mod env;
pub mod services;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::model::Settings;
use crate::docker::{ContainerDetails, ContainerRuntime, DockerRuntime, EnsureOutcome};
use crate::error::{PreviewError, Result};
use crate::health::HealthMonitor;
use crate::identity::{
    PreviewKey, ResourceKind, LABEL_COMPONENT, LABEL_KIND, LABEL_MANAGED_BY, LABEL_PROJECT,
    LABEL_ROUTE_PORT, MANAGED_BY,
};
use crate::manifest::{load_manifest, Manifest};
use crate::router::{self, RouterAdapter};
use crate::session::{FileSessionStore, LocalWorkspace, SessionStore, SessionWorkspace};
use crate::storage::StorageProvisioner;

use services::{ServiceContainerManager, ServiceOutcome, StartInputs};

/// A request to bring a preview up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub key: PreviewKey,
    /// Passed through to the session workspace.
    pub user: Option<String>,
    /// Caller-supplied variables, layered above manifest defaults.
    pub env: BTreeMap<String, String>,
}

impl PreviewRequest {
    pub fn new(key: PreviewKey) -> Self {
        Self {
            key,
            user: None,
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewHandle {
    pub url: String,
    pub services: BTreeMap<String, ServiceOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewStatus {
    pub running: bool,
    pub url: Option<String>,
    pub is_responding: bool,
}

impl PreviewStatus {
    fn down() -> Self {
        Self {
            running: false,
            url: None,
            is_responding: false,
        }
    }
}

/// One session's preview as listed for its project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionPreview {
    pub session_id: String,
    pub url: Option<String>,
    pub running: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Service and storage names a preview owns, from the manifest and from
/// container labels.
#[derive(Debug, Default)]
struct Components {
    services: BTreeSet<String>,
    storages: BTreeSet<String>,
}

/// Anything that can stop a preview; the seam the cleanup controller uses.
#[async_trait]
pub trait PreviewStopper: Send + Sync {
    /// Stop the preview. Returns whether any of its containers was running.
    async fn stop_preview(&self, key: &PreviewKey) -> Result<bool>;
}

/// Single entry point for every preview operation.
///
/// Holds the one runtime client, router and session collaborators for the
/// life of the process. Nothing about a preview is cached here: each call
/// re-reads the manifest and inspects live containers.
pub struct PreviewOrchestrator {
    settings: Settings,
    runtime: Arc<dyn ContainerRuntime>,
    router: Arc<dyn RouterAdapter>,
    workspace: Arc<dyn SessionWorkspace>,
    sessions: Arc<dyn SessionStore>,
    storage: StorageProvisioner,
    services: ServiceContainerManager,
    health: HealthMonitor,
}

impl PreviewOrchestrator {
    pub fn new(
        settings: Settings,
        runtime: Arc<dyn ContainerRuntime>,
        router: Arc<dyn RouterAdapter>,
        workspace: Arc<dyn SessionWorkspace>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let storage = StorageProvisioner::new(
            runtime.clone(),
            settings.storage.clone(),
            settings.containers.stop_timeout_secs,
        );
        let services =
            ServiceContainerManager::new(runtime.clone(), router.clone(), settings.containers.clone());
        let health = HealthMonitor::new(&settings.health);
        Self {
            settings,
            runtime,
            router,
            workspace,
            sessions,
            storage,
            services,
            health,
        }
    }

    /// Wire up the Docker runtime, the configured router and the
    /// filesystem-backed session collaborators.
    pub fn connect(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(DockerRuntime::connect().map_err(PreviewError::RuntimeUnavailable)?);
        let router = router::from_settings(&settings.router, runtime.clone());
        let workspace = Arc::new(LocalWorkspace::new(settings.workspace.root.clone()));
        let sessions = Arc::new(FileSessionStore::new(settings.sessions.file.clone()));
        Ok(Self::new(settings, runtime, router, workspace, sessions))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    pub fn router_kind(&self) -> &'static str {
        self.router.kind()
    }

    pub fn manifest_path(&self, key: &PreviewKey) -> PathBuf {
        self.workspace
            .container_path(key)
            .join(&self.settings.workspace.manifest)
    }

    async fn manifest(&self, key: &PreviewKey) -> Result<Manifest> {
        Ok(load_manifest(&self.manifest_path(key)).await?)
    }

    async fn ping(&self) -> Result<()> {
        self.runtime
            .ping()
            .await
            .map_err(PreviewError::RuntimeUnavailable)
    }

    /// Bring the whole preview up and return its external URL.
    ///
    /// Safe to call repeatedly: running containers are left alone and the
    /// same URL comes back.
    pub async fn start_preview(&self, request: &PreviewRequest) -> Result<PreviewHandle> {
        let key = &request.key;
        self.workspace
            .ensure_session_environment(key, request.user.as_deref())
            .await?;
        self.ping().await?;
        let manifest = self.manifest(key).await?;
        let entrypoint = manifest.entrypoint();
        tracing::info!(
            preview = %key,
            services = manifest.services.len(),
            storages = manifest.storages.len(),
            entrypoint = %entrypoint.name,
            "starting preview"
        );

        // Bad service input fails here, before the network or any storage exists.
        let session_root = self.workspace.container_path(key);
        let prepared = services::prepare(key, &manifest.services, &session_root).await?;

        let network = key.network_name();
        self.runtime
            .ensure_network(&network, key.resource_labels("network", ResourceKind::Network))
            .await?;

        let storages = self
            .storage
            .ensure_all(key, &manifest.storages, &network)
            .await?;

        let started = self
            .services
            .start_all(StartInputs {
                key,
                services: &manifest.services,
                entrypoint,
                prepared,
                network: &network,
                user_env: &request.env,
                storages: &storages,
            })
            .await;

        let started = match started {
            Ok(started) => started,
            Err(e) => {
                let created: Vec<String> = storages
                    .iter()
                    .filter(|s| s.outcome == EnsureOutcome::Created)
                    .map(|s| s.name.clone())
                    .collect();
                if let Err(stop_err) = self.storage.stop_all(key, &created).await {
                    tracing::warn!(preview = %key, "rollback of storages failed: {}", stop_err);
                }
                return Err(e);
            }
        };

        if let Err(e) = self.touch_session(key).await {
            tracing::warn!(preview = %key, "could not record activity: {}", e);
        }
        tracing::info!(preview = %key, url = %started.url, "preview ready");
        Ok(PreviewHandle {
            url: started.url,
            services: started.outcomes,
        })
    }

    /// Read-only view of the entrypoint: is it running, where, and does it
    /// answer on its health path.
    pub async fn get_preview_status(&self, key: &PreviewKey) -> Result<PreviewStatus> {
        let manifest = self.manifest(key).await?;
        let entrypoint = manifest.entrypoint();
        let name = key.container_name(&entrypoint.name);

        let container = match self.runtime.inspect_container(&name).await? {
            Some(c) if c.running => c,
            _ => return Ok(PreviewStatus::down()),
        };
        let Some(url) = self.router.get_container_url(&container, entrypoint.port) else {
            tracing::debug!(preview = %key, container = %name, "running entrypoint carries no route");
            return Ok(PreviewStatus {
                running: true,
                url: None,
                is_responding: false,
            });
        };
        let is_responding = self
            .health
            .probe(&url, entrypoint.health_path.as_deref())
            .await;
        Ok(PreviewStatus {
            running: true,
            url: Some(url),
            is_responding,
        })
    }

    /// Stop every container of the preview. Nothing is removed, so a later
    /// start resumes with the same data and URL.
    pub async fn stop_preview(&self, key: &PreviewKey) -> Result<()> {
        self.ping().await?;
        let parts = self.components(key).await?;
        let services: Vec<String> = parts.services.into_iter().collect();
        let storages: Vec<String> = parts.storages.into_iter().collect();

        let services_result = self.services.stop_all(key, &services).await;
        let storage_result = self.storage.stop_all(key, &storages).await;
        services_result?;
        storage_result?;
        tracing::info!(preview = %key, "preview stopped");
        Ok(())
    }

    /// Remove every container, cache volume, data volume and the network of
    /// the preview, and forget its session activity.
    pub async fn destroy_preview(&self, key: &PreviewKey) -> Result<()> {
        self.ping().await?;
        let parts = self.components(key).await?;
        let services: Vec<String> = parts.services.into_iter().collect();
        let storages: Vec<String> = parts.storages.into_iter().collect();

        let services_result = self.services.destroy_all(key, &services).await;
        let storage_result = self.storage.destroy_all(key, &storages).await;
        services_result?;
        storage_result?;

        self.runtime.remove_network(&key.network_name()).await?;
        self.sessions.remove(key).await?;
        tracing::info!(preview = %key, "preview destroyed");
        Ok(())
    }

    /// What a preview consists of. The manifest may be gone or broken by the
    /// time a preview is torn down, so container labels are always consulted
    /// as well.
    async fn components(&self, key: &PreviewKey) -> Result<Components> {
        let mut parts = Components::default();
        match self.manifest(key).await {
            Ok(manifest) => {
                parts.services.extend(manifest.services.into_keys());
                parts.storages.extend(manifest.storages.into_keys());
            }
            Err(e) => {
                tracing::warn!(preview = %key, "manifest unavailable, using container labels: {}", e);
            }
        }
        for container in self.runtime.list_containers(&key.selector()).await? {
            let Some(component) = container.labels.get(LABEL_COMPONENT) else {
                continue;
            };
            match container.labels.get(LABEL_KIND).map(String::as_str) {
                Some("service") => {
                    parts.services.insert(component.clone());
                }
                Some("storage") => {
                    parts.storages.insert(component.clone());
                }
                _ => {}
            }
        }
        Ok(parts)
    }

    /// URL of a routed container, from its labels alone.
    fn routed_url(&self, container: &ContainerDetails) -> Option<String> {
        let port: u16 = container.labels.get(LABEL_ROUTE_PORT)?.parse().ok()?;
        self.router.get_container_url(container, port)
    }

    /// Every session preview of a project.
    ///
    /// Sessions come from the session store. Only when the store knows none
    /// are managed container labels scanned instead.
    pub async fn get_project_preview_urls(&self, project_id: &str) -> Result<Vec<SessionPreview>> {
        let selector = HashMap::from([
            (LABEL_PROJECT.to_string(), project_id.to_string()),
            (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
            (LABEL_KIND.to_string(), ResourceKind::Service.as_str().to_string()),
        ]);
        let containers = self.runtime.list_containers(&selector).await?;

        let mut previews: BTreeMap<String, SessionPreview> = self
            .sessions
            .list_project(project_id)
            .await?
            .into_iter()
            .map(|record| {
                (
                    record.session_id.clone(),
                    SessionPreview {
                        session_id: record.session_id,
                        url: None,
                        running: false,
                        last_activity: Some(record.last_activity),
                    },
                )
            })
            .collect();
        let from_store = !previews.is_empty();
        if !from_store {
            tracing::debug!(project = %project_id, "session store empty, scanning container labels");
        }

        for container in &containers {
            let Some(key) = PreviewKey::from_labels(&container.labels) else {
                continue;
            };
            let Some(url) = self.routed_url(container) else {
                continue;
            };
            if from_store && !previews.contains_key(&key.session_id) {
                continue;
            }
            let entry = previews
                .entry(key.session_id.clone())
                .or_insert_with(|| SessionPreview {
                    session_id: key.session_id.clone(),
                    url: None,
                    running: false,
                    last_activity: None,
                });
            entry.url = Some(url);
            entry.running = container.running;
        }
        Ok(previews.into_values().collect())
    }

    pub async fn touch_session(&self, key: &PreviewKey) -> Result<()> {
        self.sessions.touch(key, Utc::now()).await
    }
}

#[async_trait]
impl PreviewStopper for PreviewOrchestrator {
    async fn stop_preview(&self, key: &PreviewKey) -> Result<bool> {
        self.ping().await?;
        let was_running = self
            .runtime
            .list_containers(&key.selector())
            .await?
            .iter()
            .any(|c| c.running);
        PreviewOrchestrator::stop_preview(self, key).await?;
        Ok(was_running)
    }
}
