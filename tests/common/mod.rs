#![allow(dead_code)]
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use previewrig::config::model::Settings;
use previewrig::PreviewKey;

/// A throwaway workspace: settings file, session tree root and session store
/// all live under one temp dir.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub settings_path: PathBuf,
    pub project: String,
}

impl TestWorkspace {
    /// Port router over a small range above a currently free port.
    pub fn new() -> Self {
        let start = free_port();
        let end = start.saturating_add(20);
        Self::with_router(&format!(
            "[router]\nkind = \"port\"\nhost = \"127.0.0.1\"\nport_range = [{start}, {end}]\n"
        ))
    }

    pub fn with_router(router_toml: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("sessions");
        let store = dir.path().join("sessions.json");
        let settings_path = dir.path().join("previewrig.toml");
        let toml = format!(
            "{router_toml}\n[workspace]\nroot = {root:?}\n\n[sessions]\nfile = {store:?}\n\n[storage]\nready_timeout_secs = 90\n",
            root = root.display().to_string(),
            store = store.display().to_string(),
        );
        std::fs::write(&settings_path, toml).unwrap();

        // Unique per test run so parallel tests never share Docker resources.
        let project = format!("it{:08x}", rand::random::<u32>());
        Self {
            dir,
            settings_path,
            project,
        }
    }

    pub fn settings(&self) -> Settings {
        previewrig::config::load_settings(&self.settings_path).unwrap()
    }

    pub fn key(&self, session: &str) -> PreviewKey {
        PreviewKey::new(&self.project, session).unwrap()
    }

    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.dir
            .path()
            .join("sessions")
            .join(&self.project)
            .join(session)
    }

    /// Write `preview.toml` into a session tree, creating it if needed.
    pub fn write_manifest(&self, session: &str, manifest: &str) -> PathBuf {
        let dir = self.session_dir(session);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("preview.toml");
        std::fs::write(&path, manifest).unwrap();
        path
    }

    pub fn write_file(&self, session: &str, relative: &str, contents: &str) {
        let path = self.session_dir(session).join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Poll until `check` passes or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

fn docker_lines(args: &[&str]) -> Vec<String> {
    std::process::Command::new("docker")
        .args(args)
        .output()
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Names of containers (running or not) labelled for this project.
pub fn project_containers(project: &str) -> Vec<String> {
    docker_lines(&[
        "ps",
        "-a",
        "--filter",
        &format!("label=preview.project={}", project),
        "--format",
        "{{.Names}}",
    ])
}

pub fn running_containers(project: &str) -> Vec<String> {
    docker_lines(&[
        "ps",
        "--filter",
        &format!("label=preview.project={}", project),
        "--format",
        "{{.Names}}",
    ])
}

pub fn project_volumes(project: &str) -> Vec<String> {
    docker_lines(&[
        "volume",
        "ls",
        "--filter",
        &format!("label=preview.project={}", project),
        "--format",
        "{{.Name}}",
    ])
}

/// Remove every Docker resource labelled for `project`. Goes through the
/// Docker CLI so it still works when the orchestrator under test is broken.
pub fn docker_cleanup(project: &str) {
    let filter = format!("label=preview.project={}", project);
    for id in docker_lines(&["ps", "-a", "--filter", &filter, "--format", "{{.ID}}"]) {
        let _ = std::process::Command::new("docker")
            .args(["rm", "-f", "-v", &id])
            .output();
    }
    for name in docker_lines(&["volume", "ls", "--filter", &filter, "--format", "{{.Name}}"]) {
        let _ = std::process::Command::new("docker")
            .args(["volume", "rm", "-f", &name])
            .output();
    }
    for name in docker_lines(&["network", "ls", "--filter", &filter, "--format", "{{.Name}}"]) {
        let _ = std::process::Command::new("docker")
            .args(["network", "rm", &name])
            .output();
    }
}
