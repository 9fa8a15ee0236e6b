use std::collections::{BTreeMap, HashMap};

use crate::config::interpolate::{build_template_vars, resolve_env_templates};
use crate::identity::PreviewKey;
use crate::manifest::{ManifestError, ServiceSpec};
use crate::storage::StorageConnection;

/// Internal URL one service publishes to its peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerUrl {
    pub service: String,
    pub variable: String,
    pub url: String,
}

/// Everything outside the manifest that feeds a service's environment.
#[derive(Debug, Clone, Copy)]
pub struct EnvLayers<'a> {
    pub user: &'a BTreeMap<String, String>,
    pub peers: &'a [PeerUrl],
    /// Externally reachable URL of the entrypoint, once per start.
    pub external_url: &'a str,
    pub storages: &'a [StorageConnection],
}

/// Peer URLs for every service that declares a `connection_variable`.
/// Addressed by container name, which resolves on the preview network.
pub fn peer_urls(key: &PreviewKey, services: &BTreeMap<String, ServiceSpec>) -> Vec<PeerUrl> {
    services
        .values()
        .filter_map(|svc| {
            let variable = svc.connection_variable.as_ref()?;
            Some(PeerUrl {
                service: svc.name.clone(),
                variable: variable.clone(),
                url: format!("http://{}:{}", key.container_name(&svc.name), svc.port),
            })
        })
        .collect()
}

/// Resolve the `{{ ... }}` templates of a service's static env.
pub fn resolve_static_env(
    key: &PreviewKey,
    service: &ServiceSpec,
) -> Result<BTreeMap<String, String>, ManifestError> {
    let vars: HashMap<String, String> = build_template_vars(key, &service.name, service.port);
    resolve_env_templates(&service.name, &service.env, &vars).map_err(|mut errors| {
        // Validation already rejected unknown references; report the first.
        ManifestError::Template(errors.remove(0))
    })
}

/// Build the full environment for one service.
///
/// The layering order (later overrides earlier):
/// 0. PORT and HOST for the service itself
/// 1. Static env from the manifest (templates resolved)
/// 2. Caller-supplied user variables
/// 3. Connection URLs of the other services
/// 4. External URL, for services that ask for it
/// 5. Storage connection URLs
pub fn compose_env(
    service: &ServiceSpec,
    static_env: BTreeMap<String, String>,
    layers: EnvLayers<'_>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    // 0. Baseline
    env.insert("PORT".to_string(), service.port.to_string());
    env.insert("HOST".to_string(), "0.0.0.0".to_string());

    // 1. Manifest defaults
    env.extend(static_env);

    // 2. User variables
    env.extend(layers.user.iter().map(|(k, v)| (k.clone(), v.clone())));

    // 3. Peers, never a service's own URL
    for peer in layers.peers.iter().filter(|p| p.service != service.name) {
        env.insert(peer.variable.clone(), peer.url.clone());
    }

    // 4. External URL
    if let Some(variable) = &service.external_connection_variable {
        env.insert(variable.clone(), layers.external_url.to_string());
    }

    // 5. Storages
    for storage in layers.storages {
        env.insert(storage.variable.clone(), storage.url.clone());
    }

    env
}
