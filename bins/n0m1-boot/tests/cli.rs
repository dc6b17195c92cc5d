#![cfg(unix)]

use std::process::Command;

const BOOT: &str = env!("CARGO_BIN_EXE_n0m1-boot");

#[test]
fn test_missing_database_fails_prerequisites() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("boot.yaml");
    std::fs::write(&config, "boot:\n  supervisor_executable: /bin/sh\n").unwrap();

    let output = Command::new(BOOT)
        .arg("--config")
        .arg(&config)
        .arg("--project-dir")
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Database not found"));
    assert!(!dir.path().join("pids/boot_system.pid").exists());
}
