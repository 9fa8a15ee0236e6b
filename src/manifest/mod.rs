pub mod model;
pub mod validate;

use std::path::Path;

pub use model::{Manifest, RuntimeFamily, ServiceSpec, StorageEngine, StorageSpec};
pub use validate::ManifestError;

/// Parse manifest text. `path` is only used in error messages.
pub fn parse_manifest(source: &str, path: &Path) -> Result<Manifest, ManifestError> {
    let raw: model::RawManifest = toml::from_str(source).map_err(|e| ManifestError::Parse {
        path: path.to_path_buf(),
        message: e.to_string().trim_end().to_string(),
    })?;
    validate::validate(raw)
}

/// Read and validate the manifest at `path`.
///
/// Always reads from disk: the session tree can change between calls, so
/// the result is never cached.
pub async fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let source = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ManifestError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(ManifestError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_manifest(&source, path)
}
