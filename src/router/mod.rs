pub mod port;
pub mod proxy;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::model::RouterSettings;
use crate::docker::{ContainerDetails, ContainerRuntime, ContainerSpec, PortMap};
use crate::error::Result;

pub use port::PortRouter;
pub use proxy::ProxyRouter;

/// What a router needs to know about the entrypoint container it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub container_name: String,
    pub slug: String,
    pub container_port: u16,
}

/// Routing metadata attached to the entrypoint container at creation time.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteInfo {
    Port {
        host: String,
        host_port: u16,
        container_port: u16,
    },
    Proxy {
        url: String,
        labels: HashMap<String, String>,
        network: Option<String>,
    },
}

impl RouteInfo {
    /// Externally reachable URL of the routed container.
    pub fn url(&self) -> String {
        match self {
            RouteInfo::Port {
                host, host_port, ..
            } => format!("http://{}:{}", host, host_port),
            RouteInfo::Proxy { url, .. } => url.clone(),
        }
    }

    /// Fold the routing metadata into a container spec.
    pub fn apply(&self, spec: &mut ContainerSpec) {
        match self {
            RouteInfo::Port {
                host_port,
                container_port,
                ..
            } => spec.port_bindings.push(PortMap {
                container_port: *container_port,
                host_port: *host_port,
            }),
            RouteInfo::Proxy {
                labels, network, ..
            } => {
                spec.labels
                    .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
                if let Some(network) = network {
                    spec.extra_networks.push(network.clone());
                }
            }
        }
    }
}

/// Makes the entrypoint service reachable from outside the preview network.
///
/// Implementations are interchangeable; nothing else knows which one is in use.
#[async_trait]
pub trait RouterAdapter: Send + Sync {
    /// Compute routing metadata for a container about to be created.
    async fn prepare_run(&self, target: &RouteTarget) -> Result<RouteInfo>;

    /// Recover the external URL from a live container, `None` when the
    /// container carries no routing metadata this router understands.
    fn get_container_url(&self, container: &ContainerDetails, container_port: u16) -> Option<String>;

    fn kind(&self) -> &'static str;
}

/// Build the router selected by the settings.
pub fn from_settings(
    settings: &RouterSettings,
    runtime: Arc<dyn ContainerRuntime>,
) -> Arc<dyn RouterAdapter> {
    match settings {
        RouterSettings::Port { host, port_range } => {
            Arc::new(PortRouter::new(host.clone(), *port_range, runtime))
        }
        RouterSettings::Proxy {
            base_domain,
            scheme,
            entrypoints,
            cert_resolver,
            network,
        } => Arc::new(ProxyRouter::new(
            base_domain.clone(),
            scheme.clone(),
            entrypoints.clone(),
            cert_resolver.clone(),
            network.clone(),
        )),
    }
}
