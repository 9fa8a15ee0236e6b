use anyhow::{Context, Result};
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, HostConfig, Mount, MountPointTypeEnum,
    MountTypeEnum, PortBinding,
};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use std::collections::{BTreeMap, HashMap};

use super::{has_status, ContainerDetails, ContainerSpec, MountSpec, NameConflict};

fn to_mount(spec: &MountSpec) -> Mount {
    match spec {
        MountSpec::Bind { source, target } => Mount {
            typ: Some(MountTypeEnum::BIND),
            source: Some(source.to_string_lossy().to_string()),
            target: Some(target.clone()),
            ..Default::default()
        },
        MountSpec::Volume { name, target } => Mount {
            typ: Some(MountTypeEnum::VOLUME),
            source: Some(name.clone()),
            target: Some(target.clone()),
            ..Default::default()
        },
        // No source: Docker creates an anonymous volume owned by this container.
        MountSpec::Anonymous { target } => Mount {
            typ: Some(MountTypeEnum::VOLUME),
            target: Some(target.clone()),
            ..Default::default()
        },
    }
}

/// Create a container from a spec. A name that is already taken surfaces as
/// [`NameConflict`] so callers can fall back to the existing container.
pub async fn create_container(docker: &Docker, spec: &ContainerSpec) -> Result<String> {
    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    let mut exposed_ports: Vec<String> = spec
        .exposed_ports
        .iter()
        .map(|p| format!("{}/tcp", p))
        .collect();
    for pm in &spec.port_bindings {
        let container_port_key = format!("{}/tcp", pm.container_port);
        port_bindings.insert(
            container_port_key.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(pm.host_port.to_string()),
            }]),
        );
        if !exposed_ports.contains(&container_port_key) {
            exposed_ports.push(container_port_key);
        }
    }

    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        mounts: Some(spec.mounts.iter().map(to_mount).collect()),
        network_mode: Some(spec.network.clone()),
        ..Default::default()
    };

    let config = ContainerCreateBody {
        image: Some(spec.image.clone()),
        env: Some(env),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        labels: Some(spec.labels.clone()),
        cmd: spec.cmd.clone(),
        working_dir: spec.working_dir.clone(),
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: Some(spec.name.clone()),
        ..Default::default()
    };

    match docker.create_container(Some(options), config).await {
        Ok(response) => {
            tracing::debug!(container = %spec.name, id = %response.id, "container created");
            Ok(response.id)
        }
        Err(e) if has_status(&e, 409) => Err(NameConflict(spec.name.clone()).into()),
        Err(e) => Err(e).with_context(|| format!("creating container {}", spec.name)),
    }
}

/// Start a container by name or ID. Starting a running container is a no-op.
pub async fn start_container(docker: &Docker, container: &str) -> Result<()> {
    match docker
        .start_container(container, None::<StartContainerOptions>)
        .await
    {
        Err(e) if has_status(&e, 304) => Ok(()),
        other => other.with_context(|| format!("starting container {}", container)),
    }
}

/// Stop a container by name or ID with a timeout.
pub async fn stop_container(docker: &Docker, container: &str, timeout_secs: i32) -> Result<()> {
    let options = StopContainerOptions {
        t: Some(timeout_secs),
        signal: None,
    };
    match docker.stop_container(container, Some(options)).await {
        // 304: already stopped, 404: already gone.
        Err(e) if has_status(&e, 304) || has_status(&e, 404) => Ok(()),
        other => other.with_context(|| format!("stopping container {}", container)),
    }
}

/// Remove a container by name or ID, optionally with its anonymous volumes.
pub async fn remove_container(docker: &Docker, container: &str, remove_volumes: bool) -> Result<()> {
    let options = RemoveContainerOptions {
        force: true,
        v: remove_volumes,
        ..Default::default()
    };
    match docker.remove_container(container, Some(options)).await {
        Err(e) if has_status(&e, 404) => Ok(()),
        other => other.with_context(|| format!("removing container {}", container)),
    }
}

fn parse_port_key(key: &str) -> Option<u16> {
    key.split('/').next()?.parse().ok()
}

type PortMapping = HashMap<String, Option<Vec<PortBinding>>>;

/// container port -> first host port with a concrete number.
fn host_ports(ports: Option<PortMapping>) -> BTreeMap<u16, u16> {
    let mut out = BTreeMap::new();
    for (key, bindings) in ports.unwrap_or_default() {
        let Some(container_port) = parse_port_key(&key) else {
            continue;
        };
        let host_port = bindings
            .unwrap_or_default()
            .into_iter()
            .find_map(|b| b.host_port.and_then(|p| p.parse::<u16>().ok()))
            .filter(|p| *p != 0);
        if let Some(host_port) = host_port {
            out.insert(container_port, host_port);
        }
    }
    out
}

pub(crate) fn details_from_inspect(response: ContainerInspectResponse) -> ContainerDetails {
    let config = response.config.unwrap_or_default();
    let env = config
        .env
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect();

    // A stopped container has an empty `NetworkSettings.Ports`; the
    // requested bindings only survive in `HostConfig.PortBindings`.
    let mut published_ports = host_ports(response.network_settings.and_then(|n| n.ports));
    for (container_port, host_port) in host_ports(response.host_config.and_then(|h| h.port_bindings)) {
        published_ports.entry(container_port).or_insert(host_port);
    }

    let volumes = response
        .mounts
        .unwrap_or_default()
        .into_iter()
        .filter(|m| m.typ == Some(MountPointTypeEnum::VOLUME))
        .filter_map(|m| m.name)
        .collect();

    ContainerDetails {
        id: response.id.unwrap_or_default(),
        name: response
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        running: response.state.and_then(|s| s.running).unwrap_or(false),
        labels: config.labels.unwrap_or_default(),
        env,
        published_ports,
        volumes,
    }
}

/// Inspect a container by name. `Ok(None)` when it does not exist.
pub async fn inspect_container(docker: &Docker, container: &str) -> Result<Option<ContainerDetails>> {
    match docker
        .inspect_container(container, None::<InspectContainerOptions>)
        .await
    {
        Ok(response) => Ok(Some(details_from_inspect(response))),
        Err(e) if has_status(&e, 404) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("inspecting container {}", container)),
    }
}

/// List every container (running or not) carrying all of `labels`.
pub async fn list_containers(
    docker: &Docker,
    labels: &HashMap<String, String>,
) -> Result<Vec<ContainerDetails>> {
    let mut selectors: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    selectors.sort();
    let filters = HashMap::from([("label".to_string(), selectors)]);
    let options = ListContainersOptions {
        all: true,
        filters: Some(filters),
        ..Default::default()
    };
    let summaries = docker
        .list_containers(Some(options))
        .await
        .context("listing containers")?;

    let mut details = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let Some(id) = summary.id else { continue };
        // Removed between list and inspect.
        if let Some(d) = inspect_container(docker, &id).await? {
            details.push(d);
        }
    }
    Ok(details)
}
