//! E2E tests for `stevedore watch`.
//!
//! Watch runs until interrupted; each test spawns it, waits, then kills.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tempfile::tempdir;

fn setup_watch_project(dir: &Path) {
    let descriptor = r#"[base]
image = "python:3.11-slim"

[dependencies]
installer = "true"

[entrypoint]
interpreter = "sh"
script = "handler.sh"
"#;
    fs::write(dir.join("stevedore.toml"), descriptor).unwrap();
    fs::write(dir.join("requirements.txt"), "yt-dlp==2025.1.15\n").unwrap();
    fs::write(dir.join("handler.sh"), "#!/bin/sh\nexit 0\n").unwrap();
}

fn spawn_watch(dir: &Path) -> std::process::Child {
    Command::new(env!("CARGO_BIN_EXE_stevedore"))
        .args(["--json", "watch"])
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start stevedore watch")
}

#[test]
fn watch_runs_an_initial_build() {
    let temp = tempdir().unwrap();
    setup_watch_project(temp.path());

    let mut child = spawn_watch(temp.path());
    thread::sleep(Duration::from_millis(1500));
    let _ = child.kill();
    let output = child.wait_with_output().expect("Failed to get output");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("\"event\":\"started\""),
        "expected a started event; got:\n{}",
        stdout
    );
    assert!(
        stdout.contains("\"event\":\"build_complete\""),
        "expected the initial build to complete; got:\n{}",
        stdout
    );
    assert!(
        temp.path().join(".stevedore/image/app/handler.sh").exists(),
        "initial build should materialize the workspace"
    );
}

#[test]
fn watch_rebuilds_after_a_context_change() {
    let temp = tempdir().unwrap();
    setup_watch_project(temp.path());

    let mut child = spawn_watch(temp.path());
    // Let the initial build finish, then touch a source file
    thread::sleep(Duration::from_millis(1500));
    fs::write(
        temp.path().join("handler.sh"),
        "#!/bin/sh\necho changed\nexit 0\n",
    )
    .unwrap();
    thread::sleep(Duration::from_millis(1500));

    let _ = child.kill();
    let output = child.wait_with_output().expect("Failed to get output");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("\"event\":\"file_changed\""),
        "expected a file_changed event; got:\n{}",
        stdout
    );
    assert!(
        stdout.matches("\"event\":\"build_complete\"").count() >= 2,
        "expected a rebuild after the change; got:\n{}",
        stdout
    );

    let mirrored = fs::read_to_string(temp.path().join(".stevedore/image/app/handler.sh")).unwrap();
    assert!(
        mirrored.contains("echo changed"),
        "rebuild should refresh the mirrored workspace"
    );
}
