//! Confirmation-prompt gating on destructive commands: declining (or
//! having no TTY to ask) returns exit code 3 and performs no mutation;
//! `--yes` bypasses the prompt entirely.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::process::Stdio;

use assert_cmd::Command;

fn write_executable(path: &std::path::Path, contents: &str) {
    fs::write(path, contents).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

fn make_source_pkg() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("run"), "#!/bin/sh\necho hi\n");
    fs::write(dir.path().join("VERSION"), "1.0.0\n").unwrap();
    fs::write(dir.path().join("conf.toml"), "[package]\nname = \"demo\"\n").unwrap();
    dir
}

#[test]
fn clean_without_yes_and_no_tty_declines_with_exit_code_3() {
    let target = tempfile::tempdir().unwrap();
    let src = make_source_pkg();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["install", src.path().to_str().unwrap(), "--activate"])
        .assert()
        .success();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .stdin(Stdio::null())
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["clean", "demo", "--keep", "0"])
        .assert()
        .code(3);
}

#[test]
fn clean_with_yes_bypasses_prompt() {
    let target = tempfile::tempdir().unwrap();
    let src = make_source_pkg();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["install", src.path().to_str().unwrap(), "--activate"])
        .assert()
        .success();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .stdin(Stdio::null())
        .args(["-t", target.path().to_str().unwrap(), "--local", "--yes"])
        .args(["clean", "demo", "--keep", "0"])
        .assert()
        .success();
}

#[test]
fn uninstall_declined_leaves_package_installed() {
    let target = tempfile::tempdir().unwrap();
    let src = make_source_pkg();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["install", src.path().to_str().unwrap(), "--activate"])
        .assert()
        .success();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .stdin(Stdio::null())
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["uninstall", "demo"])
        .assert()
        .code(3);

    assert!(target.path().join("demo").join("dist").join("1.0.0").exists());
}
