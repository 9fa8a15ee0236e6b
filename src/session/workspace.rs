use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;

use super::SessionWorkspace;
use crate::error::{PreviewError, Result};
use crate::identity::PreviewKey;

/// Session trees laid out as `<root>/<project>/<session>` on the local disk.
///
/// Materializing the tree's contents belongs to whatever syncs the sources;
/// this only guarantees the directory exists.
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SessionWorkspace for LocalWorkspace {
    async fn ensure_session_environment(&self, key: &PreviewKey, user: Option<&str>) -> Result<()> {
        let path = self.container_path(key);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("creating session directory {}", path.display()))?;
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("inspecting {}", path.display()))?;
        if !meta.is_dir() {
            return Err(PreviewError::NotFound(format!(
                "session directory {}",
                path.display()
            )));
        }
        tracing::debug!(preview = %key, user = ?user, path = %path.display(), "session environment ready");
        Ok(())
    }

    fn container_path(&self, key: &PreviewKey) -> PathBuf {
        self.root.join(&key.project_id).join(&key.session_id)
    }
}
