//! `appdeploy run` exercises the local foreground-run path without ever
//! touching a target layout: extract/layer, locate run script, execute.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_executable(path: &std::path::Path, contents: &str) {
    fs::write(path, contents).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

#[test]
fn no_layers_runs_the_script_directly() {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("run"), "#!/bin/sh\necho hello-from-run\n");
    fs::write(dir.path().join("VERSION"), "1.0.0\n").unwrap();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["run", "--no-layers", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello-from-run"));
}

#[test]
fn env_flag_is_visible_to_the_run_script() {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("run"), "#!/bin/sh\necho \"GREETING=$GREETING\"\n");
    fs::write(dir.path().join("VERSION"), "1.0.0\n").unwrap();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["run", "--no-layers", "-e", "GREETING=hi", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("GREETING=hi"));
}

#[test]
fn timeout_kills_a_long_running_script() {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("run"), "#!/bin/sh\nsleep 30\n");
    fs::write(dir.path().join("VERSION"), "1.0.0\n").unwrap();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["run", "--no-layers", "--timeout", "1", dir.path().to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Timeout"));
}

#[test]
fn with_layers_populates_dist_data_conf_symlinks() {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("run"), "#!/bin/sh\ncat conf.toml\n");
    fs::write(dir.path().join("VERSION"), "1.0.0\n").unwrap();
    fs::write(dir.path().join("conf.toml"), "[package]\nname = \"demo\"\n").unwrap();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["run", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("name = \"demo\""));
}
