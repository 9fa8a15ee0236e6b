use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

use crate::config;
use crate::config::model::Settings;
use crate::manifest::load_manifest;

pub async fn run(config_file: Option<&Path>, manifest: Option<PathBuf>) -> Result<()> {
    let settings = match config::resolve::resolve_settings(config_file)? {
        Some(path) => {
            let settings = config::load_settings(&path)?;
            println!("  {} {} is valid", "\u{2713}".green(), path.display());
            settings
        }
        None => Settings::default(),
    };

    let manifest_path = manifest.unwrap_or_else(|| PathBuf::from(&settings.workspace.manifest));
    let filename = manifest_path.display().to_string();

    match load_manifest(&manifest_path).await {
        Ok(manifest) => {
            println!(
                "  {} {} is valid ({} services, {} storages, entrypoint {})",
                "\u{2713}".green(),
                filename,
                manifest.services.len(),
                manifest.storages.len(),
                manifest.entrypoint().name,
            );
            Ok(())
        }
        Err(err) => {
            let report: miette::Report = err.into();
            eprintln!("{:?}", report);
            std::process::exit(1);
        }
    }
}
