pub mod container;
pub mod exec;
pub mod image;
pub mod network;
pub mod volume;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::Docker;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Port mapping: (container_port, host_port).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    pub container_port: u16,
    pub host_port: u16,
}

/// A filesystem mount for a new container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSpec {
    /// Host directory bind mount.
    Bind { source: PathBuf, target: String },
    /// Named volume that outlives the container.
    Volume { name: String, target: String },
    /// Anonymous volume; removed together with the container on destroy.
    Anonymous { target: String },
}

/// Everything needed to create a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub labels: HashMap<String, String>,
    pub cmd: Option<Vec<String>>,
    pub working_dir: Option<String>,
    /// Primary network the container is created on.
    pub network: String,
    /// Networks joined right after creation.
    pub extra_networks: Vec<String>,
    pub exposed_ports: Vec<u16>,
    pub port_bindings: Vec<PortMap>,
    pub mounts: Vec<MountSpec>,
}

/// Live state of a container, as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub labels: HashMap<String, String>,
    pub env: BTreeMap<String, String>,
    /// container port -> host port
    pub published_ports: BTreeMap<u16, u16>,
    /// Names of volumes mounted into the container.
    pub volumes: Vec<String>,
}

/// Whether a daemon error carries the given HTTP status.
pub(crate) fn has_status(err: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

/// The runtime refused to create a container because the name is taken.
#[derive(Debug, thiserror::Error)]
#[error("container name '{0}' is already in use")]
pub struct NameConflict(pub String);

/// Narrow command interface to a container engine. Every container is
/// addressed by name so existence checks need no separate index.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Connectivity probe; called before any mutation.
    async fn ping(&self) -> Result<()>;

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>>;

    /// All containers, running or stopped, carrying every label in `labels`.
    async fn list_containers(&self, labels: &HashMap<String, String>) -> Result<Vec<ContainerDetails>>;

    /// Create (but do not start) a container and attach its extra networks.
    /// Returns the container ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Starting a running container is a no-op.
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Graceful stop. Already-stopped or missing containers are not errors.
    async fn stop_container(&self, name: &str, timeout_secs: u32) -> Result<()>;

    /// Force-remove a container, and its anonymous volumes when
    /// `remove_volumes` is set. Missing containers are not errors.
    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<()>;

    async fn ensure_network(&self, name: &str, labels: HashMap<String, String>) -> Result<()>;

    async fn remove_network(&self, name: &str) -> Result<()>;

    async fn image_exists(&self, image: &str) -> bool;

    async fn pull_image(&self, image: &str) -> Result<()>;

    async fn ensure_volume(&self, name: &str, labels: HashMap<String, String>) -> Result<()>;

    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Run a command inside a running container and return its exit code.
    async fn exec(&self, name: &str, cmd: Vec<String>) -> Result<i64>;
}

/// [`ContainerRuntime`] backed by the local Docker daemon.
///
/// Built once by the caller and shared; there is no process-wide client.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the local defaults (socket or `DOCKER_HOST`).
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("connecting to Docker daemon")?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .context("Cannot connect to Docker daemon. Is Docker running?")?;
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        container::inspect_container(&self.docker, name).await
    }

    async fn list_containers(&self, labels: &HashMap<String, String>) -> Result<Vec<ContainerDetails>> {
        container::list_containers(&self.docker, labels).await
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let id = container::create_container(&self.docker, spec).await?;
        for extra in &spec.extra_networks {
            network::connect_container(&self.docker, extra, &id).await?;
        }
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        container::start_container(&self.docker, name).await
    }

    async fn stop_container(&self, name: &str, timeout_secs: u32) -> Result<()> {
        let timeout = i32::try_from(timeout_secs).unwrap_or(i32::MAX);
        container::stop_container(&self.docker, name, timeout).await
    }

    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<()> {
        container::remove_container(&self.docker, name, remove_volumes).await
    }

    async fn ensure_network(&self, name: &str, labels: HashMap<String, String>) -> Result<()> {
        network::ensure_network(&self.docker, name, labels).await
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        network::remove_network(&self.docker, name).await
    }

    async fn image_exists(&self, image: &str) -> bool {
        image::check_image_exists(&self.docker, image).await
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        image::pull_image(&self.docker, image).await
    }

    async fn ensure_volume(&self, name: &str, labels: HashMap<String, String>) -> Result<()> {
        volume::ensure_volume(&self.docker, name, labels).await
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        volume::remove_volume(&self.docker, name).await
    }

    async fn exec(&self, name: &str, cmd: Vec<String>) -> Result<i64> {
        let result = exec::exec_in_container(&self.docker, name, cmd).await?;
        if result.exit_code != 0 && !result.output.trim().is_empty() {
            tracing::debug!(container = %name, exit_code = result.exit_code, "exec output: {}", result.output.trim());
        }
        Ok(result.exit_code)
    }
}

/// Make sure `image` is usable: pull it, and if the pull fails fall back to
/// a locally cached copy.
pub async fn ensure_image(runtime: &dyn ContainerRuntime, image: &str) -> crate::error::Result<()> {
    match runtime.pull_image(image).await {
        Ok(()) => Ok(()),
        Err(pull_err) => {
            if runtime.image_exists(image).await {
                tracing::warn!(image = %image, "pull failed, using cached image: {:#}", pull_err);
                Ok(())
            } else {
                Err(crate::error::PreviewError::Image {
                    image: image.to_string(),
                    source: pull_err,
                })
            }
        }
    }
}

/// What [`ensure_running`] had to do to reach the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// No container existed; one was created and started.
    Created,
    /// A stopped container was started again.
    Started,
    /// Already running; nothing was touched.
    AlreadyRunning,
}

/// Create-if-absent, start-if-stopped, no-op-if-running.
///
/// The name lookup and the create are not atomic. When another caller wins
/// the race the runtime rejects the duplicate name and the existing
/// container is reused.
pub async fn ensure_running(
    runtime: &dyn ContainerRuntime,
    spec: &ContainerSpec,
) -> Result<(EnsureOutcome, ContainerDetails)> {
    if let Some(existing) = runtime.inspect_container(&spec.name).await? {
        if existing.running {
            return Ok((EnsureOutcome::AlreadyRunning, existing));
        }
        runtime.start_container(&spec.name).await?;
        return Ok((EnsureOutcome::Started, refreshed(runtime, &spec.name).await?));
    }

    match runtime.create_container(spec).await {
        Ok(_) => {
            // Only `Created` marks a container as ours, so one that never
            // started is removed here rather than left for the caller.
            if let Err(e) = runtime.start_container(&spec.name).await {
                if let Err(cleanup) = runtime.remove_container(&spec.name, true).await {
                    tracing::warn!(container = %spec.name, "removing unstarted container failed: {:#}", cleanup);
                }
                return Err(e);
            }
            Ok((EnsureOutcome::Created, refreshed(runtime, &spec.name).await?))
        }
        Err(e) if e.downcast_ref::<NameConflict>().is_some() => {
            tracing::debug!(container = %spec.name, "lost create race, reusing existing container");
            runtime.start_container(&spec.name).await?;
            Ok((EnsureOutcome::AlreadyRunning, refreshed(runtime, &spec.name).await?))
        }
        Err(e) => Err(e),
    }
}

async fn refreshed(runtime: &dyn ContainerRuntime, name: &str) -> Result<ContainerDetails> {
    runtime
        .inspect_container(name)
        .await?
        .with_context(|| format!("container {} vanished after start", name))
}
