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

#[tokio::test]
async fn urls_and_destroy_work_from_labels_alone() {
    if !docker_available() {
        eprintln!("Skipping: Docker not available");
        return;
    }
    let ws = TestWorkspace::new();
    let project = ws.project.clone();
    let _guard = scopeguard::guard((), |_| docker_cleanup(&project));

    let manifest = ws.write_manifest("s1", MANIFEST);
    ws.write_file("s1", "web/index.html", "ok");
    let key = ws.key("s1");

    let handle = {
        let orchestrator = PreviewOrchestrator::connect(ws.settings()).unwrap();
        orchestrator
            .start_preview(&PreviewRequest::new(key.clone()))
            .await
            .unwrap()
    };

    // Lose both the session store and the manifest.
    std::fs::remove_file(ws.dir.path().join("sessions.json")).unwrap();
    std::fs::remove_file(&manifest).unwrap();

    let orchestrator = PreviewOrchestrator::connect(ws.settings()).unwrap();
    let urls = orchestrator
        .get_project_preview_urls(&ws.project)
        .await
        .unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].session_id, "s1");
    assert_eq!(urls[0].url.as_deref(), Some(handle.url.as_str()));
    assert!(urls[0].running);
    assert_eq!(urls[0].last_activity, None);

    orchestrator.destroy_preview(&key).await.unwrap();
    assert!(project_containers(&ws.project).is_empty());
    assert!(project_volumes(&ws.project).is_empty());
}
