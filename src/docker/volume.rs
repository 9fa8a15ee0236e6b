use anyhow::{Context, Result};
use bollard::models::VolumeCreateRequest;
use bollard::query_parameters::RemoveVolumeOptions;
use bollard::Docker;
use std::collections::HashMap;

use super::has_status;

/// Create a named data volume. Docker hands back the existing volume when
/// the name is taken, so this is idempotent; a volume whose labels do not
/// match is reused but reported.
pub async fn ensure_volume(
    docker: &Docker,
    volume_name: &str,
    labels: HashMap<String, String>,
) -> Result<()> {
    let request = VolumeCreateRequest {
        name: Some(volume_name.to_string()),
        labels: Some(labels.clone()),
        ..Default::default()
    };
    let volume = docker
        .create_volume(request)
        .await
        .with_context(|| format!("creating volume {}", volume_name))?;

    let mismatched: Vec<&String> = labels
        .iter()
        .filter(|(k, v)| volume.labels.get(*k) != Some(*v))
        .map(|(k, _)| k)
        .collect();
    if !mismatched.is_empty() {
        tracing::warn!(volume = %volume_name, labels = ?mismatched, "reusing volume with unexpected labels");
    }
    Ok(())
}

/// Remove a data volume. A volume that is already gone counts as removed.
pub async fn remove_volume(docker: &Docker, volume_name: &str) -> Result<()> {
    match docker
        .remove_volume(volume_name, Some(RemoveVolumeOptions { force: false }))
        .await
    {
        Err(e) if has_status(&e, 404) => {
            tracing::debug!(volume = %volume_name, "volume already removed");
            Ok(())
        }
        other => other.with_context(|| format!("removing volume {}", volume_name)),
    }
}
