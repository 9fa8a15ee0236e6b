use serde::{de, Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// On-disk shape of `preview.toml`. Converted into [`Manifest`] by
/// [`super::validate::validate`]; nothing outside this module sees it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawManifest {
    #[serde(default)]
    pub services: BTreeMap<String, RawService>,
    #[serde(default)]
    pub storages: BTreeMap<String, RawStorage>,
}

fn default_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawService {
    pub runtime: RuntimeFamily,
    #[serde(default = "default_dir")]
    pub dir: String,
    #[serde(default)]
    pub entrypoint: bool,
    #[serde(default)]
    pub connection_variable: Option<String>,
    #[serde(default)]
    pub external_connection_variable: Option<String>,
    #[serde(default)]
    pub command: Option<StringOrList>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub health_path: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStorage {
    pub engine: StorageEngine,
    pub connection_variable: String,
}

/// A value that can be either a single string or a list of strings.
/// A single string is run through `sh -c`.
#[derive(Debug, Clone, PartialEq)]
pub struct StringOrList(pub Vec<String>);

impl StringOrList {
    pub fn into_command(self) -> Vec<String> {
        match self.0.as_slice() {
            [single] => vec!["sh".to_string(), "-c".to_string(), single.clone()],
            _ => self.0,
        }
    }
}

impl<'de> Deserialize<'de> for StringOrList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StringOrListVisitor;

        impl<'de> de::Visitor<'de> for StringOrListVisitor {
            type Value = StringOrList;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or a list of strings")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<StringOrList, E> {
                Ok(StringOrList(vec![value.to_string()]))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<StringOrList, A::Error> {
                let mut values = Vec::new();
                while let Some(value) = seq.next_element::<String>()? {
                    values.push(value);
                }
                Ok(StringOrList(values))
            }
        }

        deserializer.deserialize_any(StringOrListVisitor)
    }
}

/// Container image family of a service. Decides image, port, default
/// command and which directories are disposable caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    Node,
    Bun,
    Python,
    Static,
}

impl RuntimeFamily {
    pub fn image(&self) -> &'static str {
        match self {
            RuntimeFamily::Node => "node:20-alpine",
            RuntimeFamily::Bun => "oven/bun:1-alpine",
            RuntimeFamily::Python => "python:3.12-slim",
            RuntimeFamily::Static => "nginx:alpine",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            RuntimeFamily::Node | RuntimeFamily::Bun => 3000,
            RuntimeFamily::Python => 8000,
            RuntimeFamily::Static => 80,
        }
    }

    /// Command run when the manifest does not override it. `None` keeps the
    /// image's own CMD.
    pub fn default_command(&self) -> Option<Vec<String>> {
        let script = match self {
            RuntimeFamily::Node => "npm install && npm run dev",
            RuntimeFamily::Bun => "bun install && bun run dev",
            RuntimeFamily::Python => {
                "python -m venv .venv && .venv/bin/pip install -r requirements.txt && .venv/bin/python main.py"
            }
            RuntimeFamily::Static => return None,
        };
        Some(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
    }

    /// Paths (relative to the service directory) backed by anonymous volumes.
    pub fn cache_dirs(&self) -> &'static [&'static str] {
        match self {
            RuntimeFamily::Node => &["node_modules", ".next"],
            RuntimeFamily::Bun => &["node_modules"],
            RuntimeFamily::Python => &[".venv", "__pycache__"],
            RuntimeFamily::Static => &[],
        }
    }

    /// Where the service directory is mounted; nginx serves from its html root.
    pub fn mount_target<'a>(&self, app_dir: &'a str) -> &'a str {
        match self {
            RuntimeFamily::Static => "/usr/share/nginx/html",
            _ => app_dir,
        }
    }
}

/// Backing storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    Postgres,
    Redis,
    Mysql,
}

impl StorageEngine {
    pub fn image(&self) -> &'static str {
        match self {
            StorageEngine::Postgres => "postgres:16-alpine",
            StorageEngine::Redis => "redis:7-alpine",
            StorageEngine::Mysql => "mysql:8",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            StorageEngine::Postgres => 5432,
            StorageEngine::Redis => 6379,
            StorageEngine::Mysql => 3306,
        }
    }

    pub fn data_dir(&self) -> &'static str {
        match self {
            StorageEngine::Postgres => "/var/lib/postgresql/data",
            StorageEngine::Redis => "/data",
            StorageEngine::Mysql => "/var/lib/mysql",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageEngine::Postgres => "postgres",
            StorageEngine::Redis => "redis",
            StorageEngine::Mysql => "mysql",
        }
    }
}

/// A validated runtime service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    pub runtime: RuntimeFamily,
    /// Relative to the session tree root, never escaping it.
    pub dir: PathBuf,
    pub entrypoint: bool,
    pub connection_variable: Option<String>,
    pub external_connection_variable: Option<String>,
    pub command: Option<Vec<String>>,
    pub port: u16,
    pub health_path: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl ServiceSpec {
    pub fn image(&self) -> &'static str {
        self.runtime.image()
    }

    pub fn command(&self) -> Option<Vec<String>> {
        self.command
            .clone()
            .or_else(|| self.runtime.default_command())
    }
}

/// A validated storage declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSpec {
    pub name: String,
    pub engine: StorageEngine,
    pub connection_variable: String,
}

/// A validated manifest: at least one service, exactly one entrypoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub services: BTreeMap<String, ServiceSpec>,
    pub storages: BTreeMap<String, StorageSpec>,
    pub(super) entrypoint: String,
}

impl Manifest {
    pub fn entrypoint(&self) -> &ServiceSpec {
        &self.services[&self.entrypoint]
    }
}
