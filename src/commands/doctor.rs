use anyhow::Result;
use std::path::Path;
use std::process::Command;

use crate::config;
use crate::docker::{ContainerRuntime, DockerRuntime};

pub async fn run(config_file: Option<&Path>) -> Result<()> {
    println!("previewrig doctor");
    println!("=================");
    println!();

    let mut all_ok = true;

    match Command::new("docker").arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            println!("  [ok] {:<16} {}", "docker", version.trim());
        }
        _ => {
            println!("  [!!] {:<16} not found", "docker");
            all_ok = false;
        }
    }

    let daemon = match DockerRuntime::connect() {
        Ok(runtime) => runtime.ping().await,
        Err(e) => Err(e),
    };
    match daemon {
        Ok(()) => println!("  [ok] {:<16} reachable", "docker daemon"),
        Err(e) => {
            println!("  [!!] {:<16} {:#}", "docker daemon", e);
            all_ok = false;
        }
    }

    match config::load_or_default(config_file) {
        Ok(settings) => {
            let router = match &settings.router {
                config::model::RouterSettings::Port { port_range, .. } => {
                    format!("port {}-{}", port_range.0, port_range.1)
                }
                config::model::RouterSettings::Proxy { base_domain, .. } => {
                    format!("proxy *.{}", base_domain)
                }
            };
            println!("  [ok] {:<16} {}", "settings", router);
            println!("       {:<16} {}", "sessions", settings.workspace.root.display());
        }
        Err(e) => {
            println!("  [!!] {:<16} {:#}", "settings", e);
            all_ok = false;
        }
    }

    println!();
    if all_ok {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Previews need a reachable Docker daemon.");
    }

    Ok(())
}
