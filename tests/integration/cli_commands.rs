use assert_cmd::Command;
use predicates::prelude::*;

use crate::common::{docker_available, docker_cleanup, TestWorkspace};

fn previewrig(ws: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("previewrig").unwrap();
    cmd.arg("-f").arg(&ws.settings_path);
    cmd
}

#[test]
fn invalid_identifier_is_a_client_error() {
    let ws = TestWorkspace::new();
    previewrig(&ws)
        .args(["status", "Not Valid", "s1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("project id"));
}

#[test]
fn env_flag_requires_key_value() {
    let ws = TestWorkspace::new();
    previewrig(&ws)
        .args(["start", "proj", "s1", "-e", "NOEQUALS"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn start_without_manifest_is_a_client_error() {
    if !docker_available() {
        eprintln!("Skipping: Docker not available");
        return;
    }
    let ws = TestWorkspace::new();
    let project = ws.project.clone();
    let _guard = scopeguard::guard((), |_| docker_cleanup(&project));

    previewrig(&ws)
        .args(["start", &ws.project, "s1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("manifest not found"));
    // The session tree was still prepared.
    assert!(ws.session_dir("s1").is_dir());
}

#[test]
fn start_status_urls_destroy_through_the_binary() {
    if !docker_available() {
        eprintln!("Skipping: Docker not available");
        return;
    }
    let ws = TestWorkspace::new();
    let project = ws.project.clone();
    let _guard = scopeguard::guard((), |_| docker_cleanup(&project));

    ws.write_manifest(
        "s1",
        r#"
        [services.web]
        runtime = "static"
        entrypoint = true
        "#,
    );

    previewrig(&ws)
        .args(["start", &ws.project, "s1", "-e", "MODE=preview"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://127.0.0.1:"));

    let output = previewrig(&ws)
        .args(["status", &ws.project, "s1", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(status["running"], true);

    let output = previewrig(&ws)
        .args(["urls", &ws.project, "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let urls: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(urls[0]["session_id"], "s1");
    assert_eq!(urls[0]["url"], status["url"]);

    previewrig(&ws)
        .args(["destroy", &ws.project, "s1"])
        .assert()
        .success();

    let output = previewrig(&ws)
        .args(["urls", &ws.project, "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let urls: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(urls, serde_json::json!([]));
}
