use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use super::connect;
use crate::identity::PreviewKey;
use crate::orchestrator::PreviewRequest;
use crate::ui::summary::{print_start_summary, print_status};

pub async fn run_start(
    config_file: Option<&Path>,
    project: &str,
    session: &str,
    user: Option<String>,
    env: Vec<(String, String)>,
) -> Result<()> {
    let key = PreviewKey::new(project, session)?;
    let orchestrator = connect(config_file)?;
    let request = PreviewRequest {
        key: key.clone(),
        user,
        env: env.into_iter().collect::<BTreeMap<_, _>>(),
    };
    let handle = orchestrator.start_preview(&request).await?;
    print_start_summary(&key, &handle);
    Ok(())
}

pub async fn run_status(
    config_file: Option<&Path>,
    project: &str,
    session: &str,
    json: bool,
) -> Result<()> {
    let key = PreviewKey::new(project, session)?;
    let orchestrator = connect(config_file)?;
    let status = orchestrator.get_preview_status(&key).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status(&key, &status);
    }
    Ok(())
}

pub async fn run_stop(config_file: Option<&Path>, project: &str, session: &str) -> Result<()> {
    let key = PreviewKey::new(project, session)?;
    connect(config_file)?.stop_preview(&key).await?;
    println!("  Stopped {}", key);
    Ok(())
}

pub async fn run_destroy(config_file: Option<&Path>, project: &str, session: &str) -> Result<()> {
    let key = PreviewKey::new(project, session)?;
    connect(config_file)?.destroy_preview(&key).await?;
    println!("  Destroyed {}", key);
    Ok(())
}
