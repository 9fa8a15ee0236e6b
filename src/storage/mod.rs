pub mod url;

use anyhow::{anyhow, bail, Context};
use backon::{ExponentialBuilder, Retryable};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::model::StorageSettings;
use crate::docker::{ensure_image, ensure_running, ContainerRuntime, ContainerSpec, EnsureOutcome, MountSpec};
use crate::error::{PreviewError, Result};
use crate::identity::{PreviewKey, ResourceKind};
use crate::manifest::StorageSpec;

/// A provisioned storage and the URL services use to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConnection {
    pub name: String,
    /// Env variable that carries `url` into every service.
    pub variable: String,
    pub url: String,
    pub outcome: EnsureOutcome,
}

/// Result of bringing one storage up, with whether this call created it.
struct Attempt {
    name: String,
    created: bool,
    result: Result<StorageConnection>,
}

/// Creates, stops and destroys the backing storages of a preview.
#[derive(Clone)]
pub struct StorageProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
    settings: StorageSettings,
    stop_timeout_secs: u32,
}

impl StorageProvisioner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        settings: StorageSettings,
        stop_timeout_secs: u32,
    ) -> Self {
        Self {
            runtime,
            settings,
            stop_timeout_secs,
        }
    }

    fn container_spec(&self, key: &PreviewKey, storage: &StorageSpec, network: &str) -> ContainerSpec {
        let password = url::derive_password(&self.settings.secret, key, &storage.name);
        ContainerSpec {
            name: key.storage_container_name(&storage.name),
            image: storage.engine.image().to_string(),
            env: url::credential_env(storage.engine, &password),
            labels: key.resource_labels(&storage.name, ResourceKind::Storage),
            cmd: url::engine_command(storage.engine, &password),
            network: network.to_string(),
            mounts: vec![MountSpec::Volume {
                name: key.data_volume_name(&storage.name),
                target: storage.engine.data_dir().to_string(),
            }],
            ..Default::default()
        }
    }

    /// Bring every storage up concurrently and return their connections in
    /// manifest order.
    ///
    /// If any storage fails, the ones created by this call are stopped again
    /// (their data volumes are kept) and the first failure is returned.
    pub async fn ensure_all(
        &self,
        key: &PreviewKey,
        storages: &BTreeMap<String, StorageSpec>,
        network: &str,
    ) -> Result<Vec<StorageConnection>> {
        let mut set = tokio::task::JoinSet::new();
        for storage in storages.values() {
            let this = self.clone();
            let key = key.clone();
            let storage = storage.clone();
            let network = network.to_string();
            set.spawn(async move { this.ensure_one(&key, &storage, &network).await });
        }

        let mut connections = BTreeMap::new();
        let mut created = Vec::new();
        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            let attempt = match joined {
                Ok(attempt) => attempt,
                Err(e) => {
                    first_error.get_or_insert(PreviewError::Infrastructure(
                        anyhow!(e).context("storage task panicked"),
                    ));
                    continue;
                }
            };
            if attempt.created {
                created.push(attempt.name.clone());
            }
            match attempt.result {
                Ok(conn) => {
                    connections.insert(conn.name.clone(), conn);
                }
                Err(e) => {
                    tracing::warn!(preview = %key, storage = %attempt.name, "storage failed to start: {}", e);
                    first_error.get_or_insert(PreviewError::StartFailed {
                        kind: "storage",
                        name: attempt.name,
                        source: Box::new(e),
                    });
                }
            }
        }

        if let Some(err) = first_error {
            self.stop_named(key, &created).await;
            return Err(err);
        }
        Ok(connections.into_values().collect())
    }

    async fn ensure_one(&self, key: &PreviewKey, storage: &StorageSpec, network: &str) -> Attempt {
        let spec = self.container_spec(key, storage, network);
        let outcome = match self.bring_up(key, storage, &spec).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Attempt {
                    name: storage.name.clone(),
                    created: false,
                    result: Err(e),
                }
            }
        };

        // Past this point the container exists; a created one is rolled back
        // even when it never becomes ready.
        let password = url::derive_password(&self.settings.secret, key, &storage.name);
        let result = self
            .wait_ready(&spec.name, url::ready_command(storage.engine, &password))
            .await
            .map(|()| StorageConnection {
                name: storage.name.clone(),
                variable: storage.connection_variable.clone(),
                url: url::connection_url(storage.engine, &spec.name, &password),
                outcome,
            });
        Attempt {
            name: storage.name.clone(),
            created: outcome == EnsureOutcome::Created,
            result,
        }
    }

    async fn bring_up(
        &self,
        key: &PreviewKey,
        storage: &StorageSpec,
        spec: &ContainerSpec,
    ) -> Result<EnsureOutcome> {
        if self.runtime.inspect_container(&spec.name).await?.is_none() {
            ensure_image(self.runtime.as_ref(), &spec.image).await?;
        }

        let volume = key.data_volume_name(&storage.name);
        self.runtime
            .ensure_volume(&volume, key.resource_labels(&storage.name, ResourceKind::Volume))
            .await?;

        let (outcome, _) = ensure_running(self.runtime.as_ref(), spec).await?;
        tracing::info!(
            preview = %key,
            storage = %storage.name,
            engine = storage.engine.as_str(),
            ?outcome,
            "storage up"
        );
        Ok(outcome)
    }

    /// Poll the engine's readiness command with exponential backoff until it
    /// succeeds or the configured deadline passes.
    async fn wait_ready(&self, container: &str, cmd: Vec<String>) -> Result<()> {
        let total_timeout = Duration::from_secs(self.settings.ready_timeout_secs);
        let runtime = self.runtime.clone();

        let result = tokio::time::timeout(total_timeout, async {
            (|| async {
                let code = runtime.exec(container, cmd.clone()).await?;
                if code != 0 {
                    bail!("readiness command exited with {}", code);
                }
                Ok(())
            })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(250))
                    .with_max_delay(Duration::from_secs(3))
                    .with_max_times(200)
                    .with_jitter(),
            )
            .notify(|err: &anyhow::Error, dur: Duration| {
                tracing::debug!(container = %container, "not ready: {}, retrying in {:?}", err, dur);
            })
            .await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.context(format!("{} never became ready", container)).into()),
            Err(_) => Err(anyhow!(
                "{} not ready after {:?}",
                container,
                total_timeout
            )
            .into()),
        }
    }

    async fn stop_named(&self, key: &PreviewKey, names: &[String]) {
        for name in names {
            let container = key.storage_container_name(name);
            if let Err(e) = self
                .runtime
                .stop_container(&container, self.stop_timeout_secs)
                .await
            {
                tracing::warn!(preview = %key, storage = %name, "rollback stop failed: {:#}", e);
            }
        }
    }

    /// Stop every storage container. Containers and data volumes stay in
    /// place so the next start finds the data again.
    pub async fn stop_all(&self, key: &PreviewKey, storages: &[String]) -> Result<()> {
        for name in storages {
            self.runtime
                .stop_container(&key.storage_container_name(name), self.stop_timeout_secs)
                .await
                .with_context(|| format!("stopping storage {}", name))?;
        }
        Ok(())
    }

    /// Remove every storage container together with its anonymous volumes
    /// and its named data volume. Continues past individual failures and
    /// reports the first one.
    pub async fn destroy_all(&self, key: &PreviewKey, storages: &[String]) -> Result<()> {
        let mut first_error: Option<anyhow::Error> = None;
        for name in storages {
            let container = key.storage_container_name(name);
            let outcome = async {
                self.runtime
                    .stop_container(&container, self.stop_timeout_secs)
                    .await?;
                self.runtime.remove_container(&container, true).await?;
                self.runtime.remove_volume(&key.data_volume_name(name)).await
            }
            .await;
            if let Err(e) = outcome {
                tracing::warn!(preview = %key, storage = %name, "destroy failed: {:#}", e);
                first_error.get_or_insert(e.context(format!("destroying storage {}", name)));
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
