use assert_cmd::Command;
use predicates::prelude::*;

use crate::common::TestWorkspace;

const VALID: &str = r#"
[services.web]
runtime = "node"
dir = "web"
entrypoint = true
external_connection_variable = "PUBLIC_URL"

[services.api]
runtime = "python"
dir = "api"
connection_variable = "API_URL"

[storages.db]
engine = "postgres"
connection_variable = "DATABASE_URL"
"#;

#[test]
fn validate_accepts_a_complete_manifest() {
    let ws = TestWorkspace::new();
    let path = ws.write_manifest("s1", VALID);

    let manifest =
        previewrig::manifest::parse_manifest(&std::fs::read_to_string(&path).unwrap(), &path)
            .unwrap();
    assert_eq!(manifest.entrypoint().name, "web");
    assert_eq!(manifest.services["api"].port, 8000);

    Command::cargo_bin("previewrig")
        .unwrap()
        .args(["-f"])
        .arg(&ws.settings_path)
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 services, 1 storages, entrypoint web"));
}

#[test]
fn validate_rejects_manifest_without_entrypoint() {
    let ws = TestWorkspace::new();
    let path = ws.write_manifest(
        "s1",
        r#"
        [services.web]
        runtime = "static"
        "#,
    );

    Command::cargo_bin("previewrig")
        .unwrap()
        .arg("-f")
        .arg(&ws.settings_path)
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("entrypoint"));
}

#[test]
fn validate_rejects_duplicate_connection_variable() {
    let ws = TestWorkspace::new();
    let path = ws.write_manifest(
        "s1",
        r#"
        [services.web]
        runtime = "static"
        entrypoint = true
        connection_variable = "SHARED"

        [storages.cache]
        engine = "redis"
        connection_variable = "SHARED"
        "#,
    );

    let source = std::fs::read_to_string(&path).unwrap();
    let err = previewrig::manifest::parse_manifest(&source, &path).unwrap_err();
    assert!(err.to_string().contains("SHARED"), "got: {err}");
}

#[test]
fn validate_reports_missing_manifest() {
    let ws = TestWorkspace::new();
    let missing = ws.dir.path().join("nope.toml");

    Command::cargo_bin("previewrig")
        .unwrap()
        .arg("-f")
        .arg(&ws.settings_path)
        .arg("validate")
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("manifest not found"));
}

#[test]
fn validate_rejects_broken_settings_file() {
    let ws = TestWorkspace::with_router("[router]\nkind = \"port\"\nport_range = [5000, 4000]\n");
    let path = ws.write_manifest("s1", VALID);

    Command::cargo_bin("previewrig")
        .unwrap()
        .arg("-f")
        .arg(&ws.settings_path)
        .arg("validate")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("port_range"));
}
