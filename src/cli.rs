use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "previewrig", version, about = "Per-session preview environments on Docker")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Use a specific settings file
    #[arg(short = 'f', long = "file", global = true, env = "PREVIEWRIG_CONFIG")]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Project identifier
    pub project: String,
    /// Session identifier
    pub session: String,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start (or resume) a preview and print its URL
    Start {
        #[command(flatten)]
        preview: PreviewArgs,
        /// User the session environment is prepared for
        #[arg(long)]
        user: Option<String>,
        /// Extra environment variable for every service (KEY=VALUE)
        #[arg(short = 'e', long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
    },
    /// Show whether a preview is running and responding
    Status {
        #[command(flatten)]
        preview: PreviewArgs,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Stop a preview, keeping its containers and data
    Stop {
        #[command(flatten)]
        preview: PreviewArgs,
    },
    /// Remove a preview's containers, volumes and network
    Destroy {
        #[command(flatten)]
        preview: PreviewArgs,
    },
    /// List the preview URLs of every session of a project
    Urls {
        /// Project identifier
        project: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Stop previews whose sessions have been idle too long
    Cleanup {
        /// Idle threshold in minutes (defaults to cleanup.threshold_minutes)
        #[arg(long)]
        threshold: Option<u64>,
        /// Keep running and clean up on every cleanup.interval
        #[arg(long)]
        watch: bool,
    },
    /// Validate a preview manifest and the settings file
    Validate {
        /// Manifest to check (defaults to ./preview.toml)
        manifest: Option<PathBuf>,
    },
    /// Check that Docker is installed and reachable
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if !crate::manifest::validate::valid_env_name(key) {
        return Err(format!("'{}' is not a valid variable name", key));
    }
    Ok((key.to_string(), value.to_string()))
}
