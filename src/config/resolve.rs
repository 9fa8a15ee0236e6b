use std::path::{Path, PathBuf};

use super::SETTINGS_FILE;

/// Nearest `filename` in `start` or one of its ancestors.
pub fn find_config(start: &Path, filename: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.is_file())
}

/// Which settings file applies, if any.
///
/// An explicit path (the `-f` flag or `PREVIEWRIG_CONFIG`) must exist.
/// Without one, the nearest `previewrig.toml` above the working directory
/// is used; `Ok(None)` means defaults.
pub fn resolve_settings(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    match explicit {
        Some(path) if path.is_file() => Ok(Some(path.canonicalize()?)),
        Some(path) => anyhow::bail!("Settings file not found: {}", path.display()),
        None => Ok(find_config(&std::env::current_dir()?, SETTINGS_FILE)),
    }
}
