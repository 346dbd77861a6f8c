//! CLI-level tests for `appdeploy check`, exercised through the compiled
//! binary rather than calling `Package` directly.

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
fn valid_package_passes_check() {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("run"), "#!/bin/sh\necho hi\n");
    fs::write(dir.path().join("VERSION"), "1.0.0\n").unwrap();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["check", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn missing_run_script_fails_check() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("VERSION"), "1.0.0\n").unwrap();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["check", dir.path().to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("run"));
}

#[test]
fn strict_mode_promotes_warnings_to_failures() {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("run"), "#!/bin/sh\necho hi\n");
    fs::write(dir.path().join("VERSION"), "1.0.0\n").unwrap();
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join(".git").join("HEAD"), "ref: refs/heads/main\n").unwrap();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["check", "--strict", dir.path().to_str().unwrap()])
        .assert()
        .code(1);
}
