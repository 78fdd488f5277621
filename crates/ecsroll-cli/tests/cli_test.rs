use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn ecsroll() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ecsroll");
    cmd.env_remove("IMAGE_TAG");
    cmd
}

// ── Help / Version ──

#[test]
fn shows_help() {
    ecsroll()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Roll container images onto ECS"));
}

#[test]
fn shows_version() {
    ecsroll()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ecsroll"));
}

#[test]
fn deploy_help_lists_flags() {
    ecsroll()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--image-tag"))
        .stdout(predicate::str::contains("--service-only"));
}

// ── Init ──

#[test]
fn init_creates_config() {
    let tmp = TempDir::new().unwrap();

    ecsroll()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created ecsroll.toml"));

    let content = std::fs::read_to_string(tmp.path().join("ecsroll.toml")).unwrap();
    assert!(content.contains("[project]"));
    assert!(content.contains("[trigger]"));
}

#[test]
fn init_refuses_to_overwrite() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("ecsroll.toml"), "[project]\nname = \"keep\"\n").unwrap();

    ecsroll()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let content = std::fs::read_to_string(tmp.path().join("ecsroll.toml")).unwrap();
    assert!(content.contains("keep"));
}

// ── Plan ──

#[test]
fn plan_prints_revision_and_trigger_key() {
    let tmp = TempDir::new().unwrap();

    ecsroll()
        .current_dir(tmp.path())
        .args(["plan", "--image-tag", "abcdef1234567890"])
        .assert()
        .success()
        .stdout(predicate::str::contains("abcdef12"))
        .stdout(predicate::str::contains("force-update-abcdef1234567890"))
        .stdout(predicate::str::contains("ecsroll-app:abcdef1234567890"));
}

#[test]
fn plan_reads_tag_from_environment() {
    let tmp = TempDir::new().unwrap();

    ecsroll()
        .current_dir(tmp.path())
        .env("IMAGE_TAG", "v2")
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("force-update-v2"));
}

#[test]
fn plan_without_tag_skips_trigger() {
    let tmp = TempDir::new().unwrap();

    ecsroll()
        .current_dir(tmp.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("ecsroll-app:latest"))
        .stdout(predicate::str::contains("skipped"));
}

#[test]
fn plan_json_is_machine_readable() {
    let tmp = TempDir::new().unwrap();

    let output = ecsroll()
        .current_dir(tmp.path())
        .args(["plan", "--image-tag", "v1", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["image_tag"], "v1");
    assert_eq!(plan["revision"], "v1");
    assert_eq!(plan["trigger_key"], "force-update-v1");
    assert_eq!(plan["task_definition_id"], "TaskDefinitionv1");
}

#[test]
fn plan_uses_configured_revision_length() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("ecsroll.toml"),
        "[trigger]\nrevision_length = 4\n",
    )
    .unwrap();

    ecsroll()
        .current_dir(tmp.path())
        .args(["plan", "--image-tag", "abcdef1234567890", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"revision\": \"abcd\""));
}

#[test]
fn invalid_tag_fails_before_any_call() {
    let tmp = TempDir::new().unwrap();

    ecsroll()
        .current_dir(tmp.path())
        .args(["deploy", "--image-tag", "::"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid image tag"));
}

#[test]
fn invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("ecsroll.toml"), "[service]\ncpu = 300\n").unwrap();

    ecsroll()
        .current_dir(tmp.path())
        .args(["plan", "--image-tag", "v1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("service.cpu"));
}

// ── Deploy ──

/// Install a stand-in `aws` that answers every query with a fixed value
/// and prints changeset progress on `cloudformation deploy`.
#[cfg(unix)]
fn fake_aws(dir: &std::path::Path) -> String {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("aws");
    std::fs::write(
        &script,
        r#"#!/bin/sh
case "$*" in
  *"cloudformation deploy"*)
    echo "Waiting for changeset to be created.."
    echo "Successfully created/updated stack"
    ;;
  *list-tags-for-resource*) echo None ;;
  *) echo "fake-1,fake-2" ;;
esac
"#,
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let path = std::env::var("PATH").unwrap_or_default();
    format!("{}:{path}", dir.display())
}

#[cfg(unix)]
#[test]
fn deploy_json_is_machine_readable() {
    let tmp = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let path = fake_aws(bin.path());

    let output = ecsroll()
        .current_dir(tmp.path())
        .env("PATH", path)
        .args(["deploy", "--image-tag", "v1", "--json"])
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["image_tag"], "v1");
    assert_eq!(report["image"], "fake-1,fake-2:v1");
    assert_eq!(report["load_balancer_dns"], "fake-1,fake-2");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Deploying ecsroll-app:v1"));
    assert!(stderr.contains("Waiting for changeset"));
}
