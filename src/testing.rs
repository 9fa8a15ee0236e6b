//! In-memory container runtime used by unit tests.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerState, HostConfig, MountPoint,
    MountPointTypeEnum, NetworkSettings, PortBinding,
};

use crate::docker::container::details_from_inspect;
use crate::docker::{ContainerDetails, ContainerRuntime, ContainerSpec, MountSpec, NameConflict};

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub spec: ContainerSpec,
    pub details: ContainerDetails,
    pub anonymous: Vec<String>,
}

fn bindings(ports: impl Iterator<Item = (u16, u16)>) -> HashMap<String, Option<Vec<PortBinding>>> {
    ports
        .map(|(container, host)| {
            (
                format!("{}/tcp", container),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".into()),
                    host_port: Some(host.to_string()),
                }]),
            )
        })
        .collect()
}

impl FakeContainer {
    /// What Docker would answer for this container. `details.published_ports`
    /// plays the part of `NetworkSettings.Ports`, which is empty while stopped.
    fn inspect_response(&self) -> ContainerInspectResponse {
        ContainerInspectResponse {
            id: Some(self.details.id.clone()),
            name: Some(format!("/{}", self.details.name)),
            state: Some(ContainerState {
                running: Some(self.details.running),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                env: Some(
                    self.details
                        .env
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect(),
                ),
                labels: Some(self.details.labels.clone()),
                ..Default::default()
            }),
            host_config: Some(HostConfig {
                port_bindings: Some(bindings(
                    self.spec
                        .port_bindings
                        .iter()
                        .map(|p| (p.container_port, p.host_port)),
                )),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                ports: Some(bindings(
                    self.details
                        .published_ports
                        .iter()
                        .map(|(c, h)| (*c, *h)),
                )),
                ..Default::default()
            }),
            mounts: Some(
                self.details
                    .volumes
                    .iter()
                    .map(|v| MountPoint {
                        typ: Some(MountPointTypeEnum::VOLUME),
                        name: Some(v.clone()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn view(&self) -> ContainerDetails {
        details_from_inspect(self.inspect_response())
    }
}

#[derive(Default)]
struct State {
    containers: BTreeMap<String, FakeContainer>,
    images: HashSet<String>,
    networks: HashMap<String, HashMap<String, String>>,
    volumes: HashSet<String>,
    pulls_fail: bool,
    unreachable: bool,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    lose_create_race: HashSet<String>,
    exec_exit_code: i64,
    next_id: usize,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
    pub creates: AtomicUsize,
    pub starts: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake runtime mutex poisoned")
    }

    pub fn cache_image(&self, image: &str) {
        self.lock().images.insert(image.to_string());
    }

    pub fn fail_pulls(&self) {
        self.lock().pulls_fail = true;
    }

    pub fn set_unreachable(&self) {
        self.lock().unreachable = true;
    }

    /// Make `create_container` fail for any name ending with `suffix`.
    pub fn fail_create_for(&self, suffix: &str) {
        self.lock().fail_create.insert(suffix.to_string());
    }

    /// Make `start_container` fail for any name ending with `suffix`.
    pub fn fail_start_for(&self, suffix: &str) {
        self.lock().fail_start.insert(suffix.to_string());
    }

    /// Have a concurrent caller create and start the container first, so
    /// `create_container` reports a name conflict for any name ending with
    /// `suffix`.
    pub fn lose_create_race_for(&self, suffix: &str) {
        self.lock().lose_create_race.insert(suffix.to_string());
    }

    pub fn set_exec_exit_code(&self, code: i64) {
        self.lock().exec_exit_code = code;
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock().containers.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.lock().volumes.contains(name)
    }

    pub fn volume_count(&self) -> usize {
        self.lock().volumes.len()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.lock().networks.contains_key(name)
    }

    /// Flip a container's state behind the orchestrator's back.
    pub fn set_running(&self, name: &str, running: bool) {
        if let Some(c) = self.lock().containers.get_mut(name) {
            c.details.running = running;
            if !running {
                c.details.published_ports.clear();
            }
        }
    }
}

/// Record a stopped container for `spec` and return its id.
fn insert_container(state: &mut State, spec: &ContainerSpec) -> String {
    state.next_id += 1;
    let id = format!("id{:04}", state.next_id);
    let mut volumes = Vec::new();
    let mut anonymous = Vec::new();
    for mount in &spec.mounts {
        match mount {
            MountSpec::Volume { name, .. } => {
                state.volumes.insert(name.clone());
                volumes.push(name.clone());
            }
            MountSpec::Anonymous { .. } => {
                state.next_id += 1;
                let name = format!("anon{:04}", state.next_id);
                state.volumes.insert(name.clone());
                volumes.push(name.clone());
                anonymous.push(name);
            }
            MountSpec::Bind { .. } => {}
        }
    }

    let details = ContainerDetails {
        id: id.clone(),
        name: spec.name.clone(),
        running: false,
        labels: spec.labels.clone(),
        env: spec.env.clone(),
        published_ports: BTreeMap::new(),
        volumes,
    };
    state.containers.insert(
        spec.name.clone(),
        FakeContainer {
            spec: spec.clone(),
            details,
            anonymous,
        },
    );
    id
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        if self.lock().unreachable {
            bail!("Cannot connect to Docker daemon. Is Docker running?");
        }
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        Ok(self.lock().containers.get(name).map(FakeContainer::view))
    }

    async fn list_containers(&self, labels: &HashMap<String, String>) -> Result<Vec<ContainerDetails>> {
        Ok(self
            .lock()
            .containers
            .values()
            .filter(|c| labels.iter().all(|(k, v)| c.details.labels.get(k) == Some(v)))
            .map(FakeContainer::view)
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.lock();
        if state.containers.contains_key(&spec.name) {
            return Err(NameConflict(spec.name.clone()).into());
        }
        if state.lose_create_race.iter().any(|s| spec.name.ends_with(s.as_str())) {
            insert_container(&mut state, spec);
            if let Some(rival) = state.containers.get_mut(&spec.name) {
                rival.details.running = true;
                rival.details.published_ports = spec
                    .port_bindings
                    .iter()
                    .map(|p| (p.container_port, p.host_port))
                    .collect();
            }
            return Err(NameConflict(spec.name.clone()).into());
        }
        if state.fail_create.iter().any(|s| spec.name.ends_with(s.as_str())) {
            bail!("injected create failure for {}", spec.name);
        }
        if !state.images.contains(&spec.image) {
            bail!("No such image: {}", spec.image);
        }
        if !state.networks.contains_key(&spec.network) {
            bail!("network {} not found", spec.network);
        }

        let id = insert_container(&mut state, spec);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_start.iter().any(|s| name.ends_with(s.as_str())) {
            bail!("injected start failure for {}", name);
        }
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| anyhow!("No such container: {}", name))?;
        container.details.running = true;
        container.details.published_ports = container
            .spec
            .port_bindings
            .iter()
            .map(|p| (p.container_port, p.host_port))
            .collect();
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_container(&self, name: &str, _timeout_secs: u32) -> Result<()> {
        if let Some(c) = self.lock().containers.get_mut(name) {
            c.details.running = false;
            c.details.published_ports.clear();
        }
        Ok(())
    }

    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<()> {
        let mut state = self.lock();
        if let Some(c) = state.containers.remove(name) {
            if remove_volumes {
                for v in c.anonymous {
                    state.volumes.remove(&v);
                }
            }
        }
        Ok(())
    }

    async fn ensure_network(&self, name: &str, labels: HashMap<String, String>) -> Result<()> {
        self.lock().networks.entry(name.to_string()).or_insert(labels);
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.lock().networks.remove(name);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> bool {
        self.lock().images.contains(image)
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.lock();
        if state.pulls_fail {
            bail!("registry unreachable pulling {}", image);
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn ensure_volume(&self, name: &str, _labels: HashMap<String, String>) -> Result<()> {
        self.lock().volumes.insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state
            .containers
            .values()
            .any(|c| c.details.volumes.iter().any(|v| v == name))
        {
            bail!("volume {} is in use", name);
        }
        state.volumes.remove(name);
        Ok(())
    }

    async fn exec(&self, name: &str, _cmd: Vec<String>) -> Result<i64> {
        let state = self.lock();
        match state.containers.get(name) {
            Some(c) if c.details.running => Ok(state.exec_exit_code),
            Some(_) => bail!("container {} is not running", name),
            None => bail!("No such container: {}", name),
        }
    }
}
