use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{RouteInfo, RouteTarget, RouterAdapter};
use crate::docker::{ContainerDetails, ContainerRuntime};
use crate::error::{PreviewError, Result};
use crate::identity::{LABEL_MANAGED_BY, MANAGED_BY};

/// How long a handed-out port stays reserved in-process. Long enough for the
/// container to be created and show up in runtime metadata.
const RESERVATION_TTL: Duration = Duration::from_secs(120);

pub fn check_port_available(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// Publishes the entrypoint on a host port picked from a bounded range.
pub struct PortRouter {
    host: String,
    range: (u16, u16),
    runtime: Arc<dyn ContainerRuntime>,
    reserved: Mutex<HashMap<u16, Instant>>,
}

impl PortRouter {
    pub fn new(host: String, range: (u16, u16), runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            host,
            range,
            runtime,
            reserved: Mutex::new(HashMap::new()),
        }
    }

    /// Host ports already published by managed containers, running or not.
    /// Stopped containers keep their bindings and reclaim them on restart.
    async fn ports_in_use(&self) -> Result<HashSet<u16>> {
        let selector = HashMap::from([(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string())]);
        let containers = self.runtime.list_containers(&selector).await?;
        Ok(containers
            .iter()
            .flat_map(|c| c.published_ports.values().copied())
            .collect())
    }

    /// Pick a free port, starting at a random offset so concurrent
    /// allocations rarely probe the same candidates.
    fn allocate(&self, in_use: &HashSet<u16>) -> Result<u16> {
        let (start, end) = self.range;
        let span = u32::from(end - start) + 1;
        let offset = rand::thread_rng().gen_range(0..span);

        let mut reserved = self
            .reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        reserved.retain(|_, at| now.duration_since(*at) < RESERVATION_TTL);

        for i in 0..span {
            let port = (u32::from(start) + (offset + i) % span) as u16;
            if in_use.contains(&port) || reserved.contains_key(&port) {
                continue;
            }
            if !check_port_available(port) {
                tracing::debug!(port, "port bound by another process");
                continue;
            }
            reserved.insert(port, now);
            return Ok(port);
        }
        Err(PreviewError::PortsExhausted { start, end })
    }
}

#[async_trait]
impl RouterAdapter for PortRouter {
    async fn prepare_run(&self, target: &RouteTarget) -> Result<RouteInfo> {
        let in_use = self.ports_in_use().await?;
        let host_port = self.allocate(&in_use)?;
        tracing::debug!(container = %target.container_name, host_port, "allocated host port");
        Ok(RouteInfo::Port {
            host: self.host.clone(),
            host_port,
            container_port: target.container_port,
        })
    }

    fn get_container_url(&self, container: &ContainerDetails, container_port: u16) -> Option<String> {
        let host_port = container
            .published_ports
            .get(&container_port)
            .or_else(|| container.published_ports.values().next())?;
        Some(format!("http://{}:{}", self.host, host_port))
    }

    fn kind(&self) -> &'static str {
        "port"
    }
}
