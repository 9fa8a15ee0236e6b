use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{SessionRecord, SessionStore};
use crate::error::Result;
use crate::identity::PreviewKey;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    sessions: Vec<SessionRecord>,
}

/// [`SessionStore`] kept in a single JSON file.
///
/// Writes go to a temporary file that is renamed over the original, so a
/// crash never leaves a truncated document behind. The mutex serializes
/// read-modify-write cycles within the process.
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<SessionFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)
                .with_context(|| format!("parsing session store {}", self.path.display()))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionFile::default()),
            Err(e) => Err(anyhow::Error::from(e)
                .context(format!("reading session store {}", self.path.display()))
                .into()),
        }
    }

    async fn save(&self, file: &SessionFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(file).context("serializing session store")?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

fn matches(record: &SessionRecord, key: &PreviewKey) -> bool {
    record.project_id == key.project_id && record.session_id == key.session_id
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn touch(&self, key: &PreviewKey, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        match file.sessions.iter_mut().find(|r| matches(r, key)) {
            // Never move activity backwards.
            Some(existing) => existing.last_activity = existing.last_activity.max(at),
            None => file.sessions.push(SessionRecord {
                project_id: key.project_id.clone(),
                session_id: key.session_id.clone(),
                last_activity: at,
            }),
        }
        self.save(&file).await
    }

    async fn last_activity(&self, key: &PreviewKey) -> Result<Option<DateTime<Utc>>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        Ok(file
            .sessions
            .iter()
            .find(|r| matches(r, key))
            .map(|r| r.last_activity))
    }

    async fn list_inactive(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        Ok(file
            .sessions
            .into_iter()
            .filter(|r| r.last_activity < cutoff)
            .collect())
    }

    async fn list_project(&self, project_id: &str) -> Result<Vec<SessionRecord>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        Ok(file
            .sessions
            .into_iter()
            .filter(|r| r.project_id == project_id)
            .collect())
    }

    async fn remove(&self, key: &PreviewKey) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let before = file.sessions.len();
        file.sessions.retain(|r| !matches(r, key));
        if file.sessions.len() != before {
            self.save(&file).await?;
        }
        Ok(())
    }
}
