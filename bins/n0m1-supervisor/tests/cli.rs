#![cfg(unix)]

use n0m1_common::DesiredState;
use n0m1_store::{NewComponent, Store};
use std::path::Path;
use std::process::{Command, Output};

const SUPERVISOR: &str = env!("CARGO_BIN_EXE_n0m1-supervisor");

async fn project(dir: &Path) {
    let store = Store::open(dir.join("n0m1_agi.db")).await.unwrap();
    store.ensure_schema().await.unwrap();
    std::fs::write(dir.join("tempd.sh"), "while true; do sleep 1; done\n").unwrap();
    std::fs::write(
        dir.join("supervisor.yaml"),
        "supervisor:\n  interpreter:\n    path: /bin/sh\n  stop_timeout: 2s\n  stop_poll_interval: 50ms\n",
    )
    .unwrap();
    for (id, owner) in [("tempd", "daemon_mgr"), ("nano_01", "nano_mgr")] {
        let script = if id == "tempd" { "tempd.sh" } else { "nano.sh" };
        store
            .registry()
            .insert_component(&NewComponent::new(id, script, owner, DesiredState::Inactive))
            .await
            .unwrap();
    }
}

fn supervisor(dir: &Path, id: &str, action: &[&str]) -> Output {
    Command::new(SUPERVISOR)
        .arg("--config")
        .arg(dir.join("supervisor.yaml"))
        .arg("--project-dir")
        .arg(dir)
        .arg("--id")
        .arg(id)
        .args(action)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[tokio::test]
async fn test_start_status_stop() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path()).await;

    let output = supervisor(dir.path(), "daemon_mgr", &["start", "tempd", "--run_type", "MANUAL_RUN"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("tempd: started (PID"));

    let output = supervisor(dir.path(), "daemon_mgr", &["status", "tempd"]);
    assert!(stdout(&output).contains("tempd: RUNNING"));

    let output = supervisor(dir.path(), "daemon_mgr", &["stop", "tempd"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("tempd: stopped"));

    let output = supervisor(dir.path(), "daemon_mgr", &["status", "tempd"]);
    assert!(stdout(&output).contains("tempd: STOPPED"));
}

#[tokio::test]
async fn test_foreign_component_fails() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path()).await;

    let output = supervisor(dir.path(), "daemon_mgr", &["stop", "nano_01"]);
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_all_managed_status_lists_own_rows() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path()).await;

    let output = supervisor(dir.path(), "nano_mgr", &["all_managed", "status"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("nano_01: STOPPED"));
    assert!(!text.contains("tempd"));
}

#[test]
fn test_missing_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(SUPERVISOR)
        .arg("--project-dir")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
}
