use anyhow::anyhow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::env::{compose_env, peer_urls, resolve_static_env, EnvLayers};
use crate::config::model::ContainerSettings;
use crate::docker::{ensure_image, ensure_running, ContainerRuntime, ContainerSpec, MountSpec};
use crate::error::{PreviewError, Result};
use crate::identity::{PreviewKey, ResourceKind, LABEL_ROUTE_PORT};
use crate::manifest::ServiceSpec;
use crate::router::{RouteInfo, RouteTarget, RouterAdapter};
use crate::storage::StorageConnection;

pub use crate::docker::EnsureOutcome as ServiceOutcome;

/// Inputs of one [`ServiceContainerManager::start_all`] call.
pub struct StartInputs<'a> {
    pub key: &'a PreviewKey,
    pub services: &'a BTreeMap<String, ServiceSpec>,
    pub entrypoint: &'a ServiceSpec,
    /// Output of [`prepare`] for the same services.
    pub prepared: PreparedServices,
    pub network: &'a str,
    pub user_env: &'a BTreeMap<String, String>,
    pub storages: &'a [StorageConnection],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedServices {
    pub url: String,
    pub outcomes: BTreeMap<String, ServiceOutcome>,
}

/// Everything a fan-out task needs, owned so it can move into the task.
struct ServiceJob {
    key: PreviewKey,
    spec: ContainerSpec,
    cache_dirs: Vec<PathBuf>,
}

struct Attempt {
    service: String,
    result: Result<ServiceOutcome>,
}

/// Per-service input checked up front: resolved static env and the
/// absolute host directory to mount.
#[derive(Debug, Default)]
pub struct PreparedServices {
    static_envs: BTreeMap<String, BTreeMap<String, String>>,
    dirs: BTreeMap<String, PathBuf>,
}

/// Check everything about the services that can fail on bad input.
///
/// Runs before any container, network or storage is touched, so a
/// misconfigured preview leaves nothing behind.
pub async fn prepare(
    key: &PreviewKey,
    services: &BTreeMap<String, ServiceSpec>,
    session_root: &Path,
) -> Result<PreparedServices> {
    let mut prepared = PreparedServices::default();
    for svc in services.values() {
        prepared
            .static_envs
            .insert(svc.name.clone(), resolve_static_env(key, svc)?);
    }
    for svc in services.values() {
        prepared
            .dirs
            .insert(svc.name.clone(), service_dir(session_root, svc).await?);
    }
    Ok(prepared)
}

/// Brings the services of a preview up or down as one unit.
pub struct ServiceContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    router: Arc<dyn RouterAdapter>,
    settings: ContainerSettings,
}

impl ServiceContainerManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        router: Arc<dyn RouterAdapter>,
        settings: ContainerSettings,
    ) -> Self {
        Self {
            runtime,
            router,
            settings,
        }
    }

    /// Start every service concurrently and return the entrypoint URL.
    ///
    /// Any single failure fails the whole call. Containers this call created
    /// are then removed again; teardown problems are logged, and the caller
    /// sees the original failure. Containers reused after a lost create race
    /// belong to the winning caller and are left alone.
    pub async fn start_all(&self, inputs: StartInputs<'_>) -> Result<StartedServices> {
        let key = inputs.key;
        let PreparedServices {
            mut static_envs,
            dirs: mut service_dirs,
        } = inputs.prepared;

        self.runtime
            .ensure_network(
                inputs.network,
                key.resource_labels("network", ResourceKind::Network),
            )
            .await?;

        let (url, route) = self.resolve_route(key, inputs.entrypoint).await?;
        let peers = peer_urls(key, inputs.services);

        let mut set = tokio::task::JoinSet::new();
        for svc in inputs.services.values() {
            let static_env = static_envs.remove(&svc.name).unwrap_or_default();
            let source = service_dirs.remove(&svc.name).unwrap_or_default();
            let layers = EnvLayers {
                user: inputs.user_env,
                peers: &peers,
                external_url: &url,
                storages: inputs.storages,
            };
            let svc_route = if svc.name == inputs.entrypoint.name {
                route.as_ref()
            } else {
                None
            };
            let job = self.job_for(key, svc, &source, static_env, layers, inputs.network, svc_route);
            let runtime = self.runtime.clone();
            let service = svc.name.clone();
            set.spawn(async move {
                let fresh = matches!(runtime.inspect_container(&job.spec.name).await, Ok(None));
                let result = run_job(runtime.as_ref(), &job, fresh).await;
                Attempt { service, result }
            });
        }

        let mut outcomes = BTreeMap::new();
        let mut created = Vec::new();
        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            let attempt = match joined {
                Ok(attempt) => attempt,
                Err(e) => {
                    first_error.get_or_insert(PreviewError::Infrastructure(
                        anyhow!(e).context("service task panicked"),
                    ));
                    continue;
                }
            };
            if matches!(attempt.result, Ok(ServiceOutcome::Created)) {
                created.push(attempt.service.clone());
            }
            match attempt.result {
                Ok(outcome) => {
                    tracing::info!(preview = %key, service = %attempt.service, ?outcome, "service up");
                    outcomes.insert(attempt.service, outcome);
                }
                Err(e) => {
                    tracing::warn!(preview = %key, service = %attempt.service, "service failed to start: {}", e);
                    first_error.get_or_insert(PreviewError::StartFailed {
                        kind: "service",
                        name: attempt.service,
                        source: Box::new(e),
                    });
                }
            }
        }

        if let Some(err) = first_error {
            self.teardown(key, &created).await;
            return Err(err);
        }
        Ok(StartedServices { url, outcomes })
    }

    /// Compute the entrypoint's external URL exactly once for this call.
    ///
    /// An existing entrypoint container keeps the route it was created with,
    /// so its URL is read back instead of asking the router for a new one.
    async fn resolve_route(
        &self,
        key: &PreviewKey,
        entrypoint: &ServiceSpec,
    ) -> Result<(String, Option<RouteInfo>)> {
        let name = key.container_name(&entrypoint.name);
        if let Some(existing) = self.runtime.inspect_container(&name).await? {
            if let Some(url) = self.router.get_container_url(&existing, entrypoint.port) {
                return Ok((url, None));
            }
            // Created under a different router; recreate it with a fresh route.
            tracing::warn!(preview = %key, container = %name, "entrypoint has no usable route, recreating");
            self.runtime.remove_container(&name, true).await?;
        }

        let route = self
            .router
            .prepare_run(&RouteTarget {
                container_name: name,
                slug: key.slug(),
                container_port: entrypoint.port,
            })
            .await?;
        Ok((route.url(), Some(route)))
    }

    #[allow(clippy::too_many_arguments)]
    fn job_for(
        &self,
        key: &PreviewKey,
        svc: &ServiceSpec,
        source: &Path,
        static_env: BTreeMap<String, String>,
        layers: EnvLayers<'_>,
        network: &str,
        route: Option<&RouteInfo>,
    ) -> ServiceJob {
        let target = svc.runtime.mount_target(&self.settings.app_dir).to_string();
        let mut mounts = vec![MountSpec::Bind {
            source: source.to_path_buf(),
            target: target.clone(),
        }];
        let mut cache_dirs = Vec::new();
        for dir in svc.runtime.cache_dirs() {
            mounts.push(MountSpec::Anonymous {
                target: format!("{}/{}", target.trim_end_matches('/'), dir),
            });
            cache_dirs.push(source.join(dir));
        }

        let mut spec = ContainerSpec {
            name: key.container_name(&svc.name),
            image: svc.image().to_string(),
            env: compose_env(svc, static_env, layers),
            labels: key.resource_labels(&svc.name, ResourceKind::Service),
            cmd: svc.command(),
            working_dir: Some(target),
            network: network.to_string(),
            exposed_ports: vec![svc.port],
            mounts,
            ..Default::default()
        };
        if let Some(route) = route {
            route.apply(&mut spec);
            spec.labels
                .insert(LABEL_ROUTE_PORT.to_string(), svc.port.to_string());
        }

        ServiceJob {
            key: key.clone(),
            spec,
            cache_dirs,
        }
    }

    async fn teardown(&self, key: &PreviewKey, services: &[String]) {
        for service in services {
            let name = key.container_name(service);
            if let Err(e) = self.runtime.remove_container(&name, true).await {
                tracing::warn!(preview = %key, service = %service, "teardown failed: {:#}", e);
            }
        }
    }

    /// Gracefully stop one service; the container and its caches stay.
    pub async fn stop(&self, key: &PreviewKey, service: &str) -> Result<()> {
        self.runtime
            .stop_container(&key.container_name(service), self.settings.stop_timeout_secs)
            .await?;
        Ok(())
    }

    /// Stop and remove one service together with its anonymous volumes.
    pub async fn destroy(&self, key: &PreviewKey, service: &str) -> Result<()> {
        let name = key.container_name(service);
        self.runtime
            .stop_container(&name, self.settings.stop_timeout_secs)
            .await?;
        self.runtime.remove_container(&name, true).await?;
        Ok(())
    }

    /// Stop every listed service, attempting all of them before reporting
    /// the first failure.
    pub async fn stop_all(&self, key: &PreviewKey, services: &[String]) -> Result<()> {
        let mut first_error = None;
        for service in services {
            if let Err(e) = self.stop(key, service).await {
                tracing::warn!(preview = %key, service = %service, "stop failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn destroy_all(&self, key: &PreviewKey, services: &[String]) -> Result<()> {
        let mut first_error = None;
        for service in services {
            if let Err(e) = self.destroy(key, service).await {
                tracing::warn!(preview = %key, service = %service, "destroy failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Absolute host directory of a service, which must already exist.
async fn service_dir(session_root: &Path, svc: &ServiceSpec) -> Result<PathBuf> {
    let dir = session_root.join(&svc.dir);
    match tokio::fs::canonicalize(&dir).await {
        Ok(path) if path.is_dir() => Ok(path),
        Ok(_) | Err(_) => Err(PreviewError::StartFailed {
            kind: "service",
            name: svc.name.clone(),
            source: Box::new(PreviewError::NotFound(format!("directory {}", dir.display()))),
        }),
    }
}

async fn run_job(
    runtime: &dyn ContainerRuntime,
    job: &ServiceJob,
    fresh: bool,
) -> Result<ServiceOutcome> {
    // An existing container already has its image.
    if fresh {
        ensure_image(runtime, &job.spec.image).await?;
    }

    // Pre-create cache mount points so the runtime does not create them as root.
    for dir in &job.cache_dirs {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::debug!(preview = %job.key, dir = %dir.display(), "could not create cache dir: {}", e);
        }
    }

    let (outcome, _) = ensure_running(runtime, &job.spec).await?;
    Ok(outcome)
}
