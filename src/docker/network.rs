use anyhow::{Context, Result};
use bollard::models::{EndpointSettings, NetworkConnectRequest, NetworkCreateRequest};
use bollard::Docker;
use std::collections::HashMap;

use super::has_status;

/// Create the per-preview bridge network unless it already exists.
pub async fn ensure_network(
    docker: &Docker,
    network_name: &str,
    labels: HashMap<String, String>,
) -> Result<()> {
    match docker.inspect_network(network_name, None).await {
        Ok(_) => return Ok(()),
        Err(e) if has_status(&e, 404) => {}
        Err(e) => return Err(e).with_context(|| format!("inspecting network {}", network_name)),
    }

    let request = NetworkCreateRequest {
        name: network_name.to_string(),
        driver: Some("bridge".to_string()),
        labels: Some(labels),
        ..Default::default()
    };
    match docker.create_network(request).await {
        Ok(_) => {
            tracing::debug!(network = %network_name, "created network");
            Ok(())
        }
        // Another start of the same preview got there first.
        Err(e) if has_status(&e, 409) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("creating network {}", network_name)),
    }
}

/// Remove the preview network. Already gone is fine.
pub async fn remove_network(docker: &Docker, network_name: &str) -> Result<()> {
    match docker.remove_network(network_name).await {
        Err(e) if has_status(&e, 404) => Ok(()),
        other => other.with_context(|| format!("removing network {}", network_name)),
    }
}

/// Attach a container to a second network, e.g. the one shared with a
/// reverse proxy.
pub async fn connect_container(docker: &Docker, network_name: &str, container: &str) -> Result<()> {
    let request = NetworkConnectRequest {
        container: container.to_string(),
        endpoint_config: Some(EndpointSettings::default()),
    };
    docker
        .connect_network(network_name, request)
        .await
        .with_context(|| format!("connecting {} to network {}", container, network_name))
}
