use std::time::Duration;

use previewrig::orchestrator::services::ServiceOutcome;
use previewrig::{PreviewOrchestrator, PreviewRequest};

use crate::common::{
    docker_available, docker_cleanup, eventually, project_containers, running_containers,
    TestWorkspace,
};

const MANIFEST: &str = r#"
[services.web]
runtime = "static"
dir = "web"
entrypoint = true
external_connection_variable = "PUBLIC_URL"
env = { GREETING = "hello from {{ project }}" }

[services.api]
runtime = "static"
dir = "api"
connection_variable = "API_URL"
"#;

fn container_env(name: &str) -> Vec<String> {
    let output = std::process::Command::new("docker")
        .args(["inspect", "--format", "{{json .Config.Env}}", name])
        .output()
        .unwrap();
    serde_json::from_slice(&output.stdout).unwrap_or_default()
}

fn prepare(ws: &TestWorkspace, session: &str) {
    ws.write_manifest(session, MANIFEST);
    ws.write_file(session, "web/index.html", "<h1>hello preview</h1>");
    ws.write_file(session, "api/index.html", "api");
}

#[tokio::test]
async fn start_status_and_idempotent_restart() {
    if !docker_available() {
        eprintln!("Skipping: Docker not available");
        return;
    }
    let ws = TestWorkspace::new();
    let project = ws.project.clone();
    let _guard = scopeguard::guard((), |_| docker_cleanup(&project));

    prepare(&ws, "s1");
    let orchestrator = PreviewOrchestrator::connect(ws.settings()).unwrap();
    let key = ws.key("s1");

    let mut request = PreviewRequest::new(key.clone());
    request.env.insert("FEATURE_FLAG".into(), "on".into());
    let handle = orchestrator.start_preview(&request).await.unwrap();
    assert!(handle.url.starts_with("http://127.0.0.1:"), "url: {}", handle.url);
    assert_eq!(handle.services["web"], ServiceOutcome::Created);
    assert_eq!(handle.services["api"], ServiceOutcome::Created);

    // The entrypoint serves the session tree.
    let url = handle.url.clone();
    assert!(
        eventually(Duration::from_secs(30), || {
            let url = url.clone();
            async move {
                match reqwest::get(&url).await {
                    Ok(r) => r.text().await.is_ok_and(|t| t.contains("hello preview")),
                    Err(_) => false,
                }
            }
        })
        .await,
        "entrypoint never served the session tree"
    );

    let status = orchestrator.get_preview_status(&key).await.unwrap();
    assert!(status.running);
    assert!(status.is_responding);
    assert_eq!(status.url.as_deref(), Some(handle.url.as_str()));

    // Environment wiring.
    let web_env = container_env(&key.container_name("web"));
    assert!(web_env.contains(&format!("PUBLIC_URL={}", handle.url)));
    assert!(web_env.contains(&format!("API_URL=http://{}:80", key.container_name("api"))));
    assert!(web_env.contains(&format!("GREETING=hello from {}", ws.project)));
    assert!(web_env.contains(&"FEATURE_FLAG=on".to_string()));
    let api_env = container_env(&key.container_name("api"));
    assert!(!api_env.iter().any(|e| e.starts_with("API_URL=")));

    // Second start touches nothing and returns the same URL.
    let again = orchestrator.start_preview(&request).await.unwrap();
    assert_eq!(again.url, handle.url);
    assert!(again
        .services
        .values()
        .all(|o| *o == ServiceOutcome::AlreadyRunning));
    assert_eq!(project_containers(&ws.project).len(), 2);

    orchestrator.destroy_preview(&key).await.unwrap();
    assert!(project_containers(&ws.project).is_empty());
}

#[tokio::test]
async fn stop_then_start_resumes_on_same_url() {
    if !docker_available() {
        eprintln!("Skipping: Docker not available");
        return;
    }
    let ws = TestWorkspace::new();
    let project = ws.project.clone();
    let _guard = scopeguard::guard((), |_| docker_cleanup(&project));

    prepare(&ws, "s1");
    let orchestrator = PreviewOrchestrator::connect(ws.settings()).unwrap();
    let key = ws.key("s1");
    let request = PreviewRequest::new(key.clone());

    let first = orchestrator.start_preview(&request).await.unwrap();
    orchestrator.stop_preview(&key).await.unwrap();

    assert!(running_containers(&ws.project).is_empty());
    assert_eq!(project_containers(&ws.project).len(), 2);
    let status = orchestrator.get_preview_status(&key).await.unwrap();
    assert!(!status.running);
    assert_eq!(status.url, None);

    // Stop is idempotent.
    orchestrator.stop_preview(&key).await.unwrap();

    let resumed = orchestrator.start_preview(&request).await.unwrap();
    assert_eq!(resumed.url, first.url);
    assert!(resumed
        .services
        .values()
        .all(|o| *o == ServiceOutcome::Started));

    orchestrator.destroy_preview(&key).await.unwrap();
}

#[tokio::test]
async fn sessions_of_one_project_are_isolated() {
    if !docker_available() {
        eprintln!("Skipping: Docker not available");
        return;
    }
    let ws = TestWorkspace::new();
    let project = ws.project.clone();
    let _guard = scopeguard::guard((), |_| docker_cleanup(&project));

    prepare(&ws, "alpha");
    prepare(&ws, "beta");
    let orchestrator = PreviewOrchestrator::connect(ws.settings()).unwrap();

    let a = orchestrator
        .start_preview(&PreviewRequest::new(ws.key("alpha")))
        .await
        .unwrap();
    let b = orchestrator
        .start_preview(&PreviewRequest::new(ws.key("beta")))
        .await
        .unwrap();
    assert_ne!(a.url, b.url);

    let urls = orchestrator
        .get_project_preview_urls(&ws.project)
        .await
        .unwrap();
    let sessions: Vec<&str> = urls.iter().map(|p| p.session_id.as_str()).collect();
    assert_eq!(sessions, ["alpha", "beta"]);
    assert!(urls.iter().all(|p| p.running && p.last_activity.is_some()));
    assert_eq!(urls[0].url.as_deref(), Some(a.url.as_str()));

    // Destroying one session leaves the other running.
    orchestrator.destroy_preview(&ws.key("alpha")).await.unwrap();
    let status = orchestrator.get_preview_status(&ws.key("beta")).await.unwrap();
    assert!(status.running);
    let urls = orchestrator
        .get_project_preview_urls(&ws.project)
        .await
        .unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].session_id, "beta");

    orchestrator.destroy_preview(&ws.key("beta")).await.unwrap();
}

#[tokio::test]
async fn missing_service_directory_fails_without_side_effects() {
    if !docker_available() {
        eprintln!("Skipping: Docker not available");
        return;
    }
    let ws = TestWorkspace::new();
    let project = ws.project.clone();
    let _guard = scopeguard::guard((), |_| docker_cleanup(&project));

    ws.write_manifest("s1", MANIFEST);
    ws.write_file("s1", "web/index.html", "only web");
    let orchestrator = PreviewOrchestrator::connect(ws.settings()).unwrap();

    let err = orchestrator
        .start_preview(&PreviewRequest::new(ws.key("s1")))
        .await
        .unwrap_err();
    assert!(err.is_client_error(), "got: {err}");
    assert!(project_containers(&ws.project).is_empty());
}
