use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::identity::PreviewKey;
use crate::manifest::StorageEngine;

/// Database and user name every provisioned storage is created with.
pub const STORAGE_USER: &str = "preview";

/// Derive the password for one storage of one preview.
///
/// Pure function of the configured secret and the names, so a storage that is
/// stopped and started again (or recreated over its preserved data volume)
/// keeps answering to the same URL.
pub fn derive_password(secret: &str, key: &PreviewKey, storage: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [
        secret,
        key.project_id.as_str(),
        key.session_id.as_str(),
        storage,
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..12])
}

/// Connection URL as seen from inside the preview network, where `host` is
/// the storage container's name.
pub fn connection_url(engine: StorageEngine, host: &str, password: &str) -> String {
    let port = engine.port();
    match engine {
        StorageEngine::Postgres => format!(
            "postgres://{user}:{password}@{host}:{port}/{user}",
            user = STORAGE_USER
        ),
        StorageEngine::Redis => format!("redis://:{password}@{host}:{port}"),
        StorageEngine::Mysql => format!(
            "mysql://{user}:{password}@{host}:{port}/{user}",
            user = STORAGE_USER
        ),
    }
}

/// Environment that makes the engine's image initialise itself with the
/// derived credentials.
pub fn credential_env(engine: StorageEngine, password: &str) -> BTreeMap<String, String> {
    let pairs: Vec<(&str, &str)> = match engine {
        StorageEngine::Postgres => vec![
            ("POSTGRES_USER", STORAGE_USER),
            ("POSTGRES_PASSWORD", password),
            ("POSTGRES_DB", STORAGE_USER),
        ],
        StorageEngine::Redis => Vec::new(),
        StorageEngine::Mysql => vec![
            ("MYSQL_USER", STORAGE_USER),
            ("MYSQL_PASSWORD", password),
            ("MYSQL_ROOT_PASSWORD", password),
            ("MYSQL_DATABASE", STORAGE_USER),
        ],
    };
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Command override for engines configured through flags instead of env.
pub fn engine_command(engine: StorageEngine, password: &str) -> Option<Vec<String>> {
    match engine {
        StorageEngine::Redis => Some(
            [
                "redis-server",
                "--appendonly",
                "yes",
                "--requirepass",
                password,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ),
        _ => None,
    }
}

/// In-container command that exits 0 once the engine accepts connections.
pub fn ready_command(engine: StorageEngine, password: &str) -> Vec<String> {
    match engine {
        StorageEngine::Postgres => vec![
            "pg_isready".to_string(),
            "-h".to_string(),
            "localhost".to_string(),
            "-U".to_string(),
            STORAGE_USER.to_string(),
            "-q".to_string(),
        ],
        StorageEngine::Redis => vec![
            "redis-cli".to_string(),
            "--no-auth-warning".to_string(),
            "-a".to_string(),
            password.to_string(),
            "ping".to_string(),
        ],
        StorageEngine::Mysql => vec![
            "mysqladmin".to_string(),
            "ping".to_string(),
            "-h".to_string(),
            "127.0.0.1".to_string(),
            "-uroot".to_string(),
            format!("-p{}", password),
            "--silent".to_string(),
        ],
    }
}
