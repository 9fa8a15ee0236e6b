pub mod cleanup;
pub mod doctor;
pub mod preview;
pub mod urls;
pub mod validate;

use anyhow::Result;
use std::path::Path;

use crate::config;
use crate::orchestrator::PreviewOrchestrator;

/// Load settings the way every command does and connect to Docker.
pub(crate) fn connect(config_file: Option<&Path>) -> Result<PreviewOrchestrator> {
    let settings = config::load_or_default(config_file)?;
    Ok(PreviewOrchestrator::connect(settings)?)
}
