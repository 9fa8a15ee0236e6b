use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::error::PreviewError;

pub const LABEL_PROJECT: &str = "preview.project";
pub const LABEL_SESSION: &str = "preview.session";
pub const LABEL_COMPONENT: &str = "preview.component";
pub const LABEL_KIND: &str = "preview.kind";
pub const LABEL_MANAGED_BY: &str = "preview.managed-by";
/// Container port the router exposes; present only on the entrypoint.
pub const LABEL_ROUTE_PORT: &str = "preview.route-port";
pub const MANAGED_BY: &str = "previewrig";

/// The (project, session) pair every preview resource is named after.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreviewKey {
    pub project_id: String,
    pub session_id: String,
}

/// What a labelled Docker resource belongs to within a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Service,
    Storage,
    Network,
    Volume,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Service => "service",
            ResourceKind::Storage => "storage",
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
        }
    }
}

fn valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && !id.starts_with(['.', '-'])
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Compute the short hash that disambiguates a key once it is flattened
/// into a Docker name: first 8 hex characters of SHA-256 over
/// `project \0 session`.
///
/// The NUL separator keeps `("a-b", "c")` and `("a", "b-c")` apart even
/// though both flatten to `a-b-c`.
pub fn compute_key_hash(project_id: &str, session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(session_id.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..4])
}

impl PreviewKey {
    /// Build a key, rejecting identifiers that cannot be embedded in Docker
    /// resource names.
    pub fn new(project_id: &str, session_id: &str) -> Result<Self, PreviewError> {
        for (what, id) in [("project id", project_id), ("session id", session_id)] {
            if !valid_identifier(id) {
                return Err(PreviewError::InvalidIdentifier {
                    what,
                    value: id.to_string(),
                });
            }
        }
        Ok(Self {
            project_id: project_id.to_string(),
            session_id: session_id.to_string(),
        })
    }

    /// Lowercased `project-session-hash`, unique per key and stable across calls.
    pub fn slug(&self) -> String {
        let hash = compute_key_hash(&self.project_id, &self.session_id);
        format!("{}-{}-{}", self.project_id, self.session_id, hash).to_ascii_lowercase()
    }

    /// Service containers live under `svc-` so they never share a name with
    /// a storage container, whatever the manifest calls its services.
    pub fn container_name(&self, service: &str) -> String {
        format!("preview-{}-svc-{}", self.slug(), service)
    }

    pub fn storage_container_name(&self, storage: &str) -> String {
        format!("preview-{}-storage-{}", self.slug(), storage)
    }

    pub fn data_volume_name(&self, storage: &str) -> String {
        format!("preview-{}-storage-{}-data", self.slug(), storage)
    }

    pub fn network_name(&self) -> String {
        format!("preview-{}-net", self.slug())
    }

    /// Standard label set attached to every Docker resource of this preview.
    pub fn resource_labels(&self, component: &str, kind: ResourceKind) -> HashMap<String, String> {
        HashMap::from([
            (LABEL_PROJECT.to_string(), self.project_id.clone()),
            (LABEL_SESSION.to_string(), self.session_id.clone()),
            (LABEL_COMPONENT.to_string(), component.to_string()),
            (LABEL_KIND.to_string(), kind.as_str().to_string()),
            (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        ])
    }

    /// Labels selecting every resource of this preview.
    pub fn selector(&self) -> HashMap<String, String> {
        HashMap::from([
            (LABEL_PROJECT.to_string(), self.project_id.clone()),
            (LABEL_SESSION.to_string(), self.session_id.clone()),
        ])
    }

    /// Recover a key from the labels of a managed resource.
    pub fn from_labels(labels: &HashMap<String, String>) -> Option<Self> {
        let project = labels.get(LABEL_PROJECT)?;
        let session = labels.get(LABEL_SESSION)?;
        Self::new(project, session).ok()
    }
}

impl fmt::Display for PreviewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.session_id)
    }
}
