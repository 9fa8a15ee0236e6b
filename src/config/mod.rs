pub mod interpolate;
pub mod model;
pub mod resolve;

use std::path::Path;

use model::Settings;

pub const SETTINGS_FILE: &str = "previewrig.toml";

/// Read, parse and validate a settings file.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read settings file {}: {}", path.display(), e))?;
    let settings: Settings = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse settings file {}: {}", path.display(), e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid settings in {}: {}", path.display(), e))?;
    Ok(settings)
}

/// Load settings from an explicit path, the nearest `previewrig.toml`, or
/// fall back to defaults when neither exists.
pub fn load_or_default(cli_file: Option<&Path>) -> anyhow::Result<Settings> {
    match resolve::resolve_settings(cli_file)? {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading settings");
            load_settings(&path)
        }
        None => {
            tracing::debug!("no {} found, using defaults", SETTINGS_FILE);
            Ok(Settings::default())
        }
    }
}
