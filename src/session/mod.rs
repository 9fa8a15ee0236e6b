pub mod store;
pub mod workspace;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::identity::PreviewKey;

pub use store::FileSessionStore;
pub use workspace::LocalWorkspace;

/// Last-activity bookkeeping for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub project_id: String,
    pub session_id: String,
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    pub fn key(&self) -> Result<PreviewKey> {
        PreviewKey::new(&self.project_id, &self.session_id)
    }
}

/// Materializes a session's source tree on disk.
#[async_trait]
pub trait SessionWorkspace: Send + Sync {
    /// Idempotently make sure the tree for `key` exists.
    async fn ensure_session_environment(&self, key: &PreviewKey, user: Option<&str>) -> Result<()>;

    /// Host path of the session tree.
    fn container_path(&self, key: &PreviewKey) -> PathBuf;
}

/// Persistent last-activity timestamps.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn touch(&self, key: &PreviewKey, at: DateTime<Utc>) -> Result<()>;

    async fn last_activity(&self, key: &PreviewKey) -> Result<Option<DateTime<Utc>>>;

    /// Sessions whose last activity is strictly before `cutoff`.
    async fn list_inactive(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionRecord>>;

    async fn list_project(&self, project_id: &str) -> Result<Vec<SessionRecord>>;

    async fn remove(&self, key: &PreviewKey) -> Result<()>;
}
