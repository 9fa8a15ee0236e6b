use anyhow::Result;
use std::path::Path;

use super::connect;
use crate::ui::summary::print_project_urls;

pub async fn run(config_file: Option<&Path>, project: &str, json: bool) -> Result<()> {
    let orchestrator = connect(config_file)?;
    let previews = orchestrator.get_project_preview_urls(project).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&previews)?);
    } else {
        print_project_urls(project, &previews);
    }
    Ok(())
}
