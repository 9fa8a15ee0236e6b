use previewrig::{PreviewOrchestrator, PreviewRequest};

use crate::common::{
    docker_available, docker_cleanup, project_containers, project_volumes, TestWorkspace,
};

const MANIFEST: &str = r#"
[services.web]
runtime = "static"
dir = "web"
entrypoint = true

[storages.cache]
engine = "redis"
connection_variable = "REDIS_URL"
"#;

fn redis_url_of(container: &str) -> String {
    let output = std::process::Command::new("docker")
        .args(["inspect", "--format", "{{json .Config.Env}}", container])
        .output()
        .unwrap();
    let env: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    env.into_iter()
        .find_map(|e| e.strip_prefix("REDIS_URL=").map(str::to_string))
        .expect("REDIS_URL injected")
}

/// `redis://:<password>@host:6379` -> password
fn password_of(url: &str) -> String {
    let rest = url.strip_prefix("redis://:").unwrap();
    rest.split('@').next().unwrap().to_string()
}

fn redis_cli(container: &str, password: &str, args: &[&str]) -> String {
    let output = std::process::Command::new("docker")
        .args(["exec", container, "redis-cli", "--no-auth-warning", "-a", password])
        .args(args)
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[tokio::test]
async fn storage_data_survives_stop_and_is_gone_after_destroy() {
    if !docker_available() {
        eprintln!("Skipping: Docker not available");
        return;
    }
    let ws = TestWorkspace::new();
    let project = ws.project.clone();
    let _guard = scopeguard::guard((), |_| docker_cleanup(&project));

    ws.write_manifest("s1", MANIFEST);
    ws.write_file("s1", "web/index.html", "ok");
    let orchestrator = PreviewOrchestrator::connect(ws.settings()).unwrap();
    let key = ws.key("s1");
    let request = PreviewRequest::new(key.clone());

    orchestrator.start_preview(&request).await.unwrap();
    let url = redis_url_of(&key.container_name("web"));
    assert!(url.ends_with(&format!("@{}:6379", key.storage_container_name("cache"))));
    let password = password_of(&url);
    let storage = key.storage_container_name("cache");

    assert_eq!(redis_cli(&storage, &password, &["SET", "greeting", "hi"]), "OK");

    orchestrator.stop_preview(&key).await.unwrap();
    assert_eq!(project_volumes(&ws.project), [key.data_volume_name("cache")]);

    orchestrator.start_preview(&request).await.unwrap();
    assert_eq!(redis_url_of(&key.container_name("web")), url);
    assert_eq!(redis_cli(&storage, &password, &["GET", "greeting"]), "hi");

    orchestrator.destroy_preview(&key).await.unwrap();
    assert!(project_containers(&ws.project).is_empty());
    assert!(project_volumes(&ws.project).is_empty());

    // A fresh start after destroy begins with empty storage.
    orchestrator.start_preview(&request).await.unwrap();
    assert_eq!(redis_cli(&storage, &password, &["GET", "greeting"]), "");
    orchestrator.destroy_preview(&key).await.unwrap();
}
