//! End-to-end local-target workflow: package a directory into an
//! archive, install it, activate it, list it, and clean it up again.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use assert_cmd::Command;

fn write_executable(path: &std::path::Path, contents: &str) {
    fs::write(path, contents).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

fn make_source_pkg(version: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_executable(&dir.path().join("run"), "#!/bin/sh\necho hi\n");
    fs::write(dir.path().join("VERSION"), format!("{version}\n")).unwrap();
    fs::write(dir.path().join("conf.toml"), "[package]\nname = \"demo\"\n").unwrap();
    dir
}

#[test]
fn package_then_install_then_list_then_clean() {
    let src = make_source_pkg("1.0.0");
    let workdir = tempfile::tempdir().unwrap();
    let archive = workdir.path().join("demo-1.0.0.tar.gz");

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args([
            "package",
            src.path().to_str().unwrap(),
            archive.to_str().unwrap(),
        ])
        .assert()
        .success();
    assert!(archive.exists());

    let target = tempfile::tempdir().unwrap();
    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["install", archive.to_str().unwrap(), "--activate"])
        .assert()
        .success();

    assert!(target.path().join("demo").join("dist").join("1.0.0").join("run").exists());
    assert!(target.path().join("demo").join("run").join(".version").exists());

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicates::str::contains("\"demo\""))
        .stdout(predicates::str::contains("\"active\""));

    // Two more versions, neither activated, installed far enough apart in
    // time that mtime ordering between them is unambiguous.
    let src2 = make_source_pkg("2.0.0");
    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["install", src2.path().to_str().unwrap(), "-n", "demo", "-r", "2.0.0"])
        .assert()
        .success();
    std::thread::sleep(std::time::Duration::from_secs(1));
    let src3 = make_source_pkg("3.0.0");
    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["install", src3.path().to_str().unwrap(), "-n", "demo", "-r", "3.0.0"])
        .assert()
        .success();
    assert!(target.path().join("demo").join("dist").join("2.0.0").exists());
    assert!(target.path().join("demo").join("dist").join("3.0.0").exists());

    // keep=0 is a deliberate no-op (there is no meaningful "keep nothing").
    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local", "--yes"])
        .args(["clean", "demo", "--keep", "0"])
        .assert()
        .success();
    assert!(target.path().join("demo").join("dist").join("2.0.0").exists());

    // keep=1 retains the active version plus the single most recent
    // inactive one (3.0.0), pruning the older inactive version (2.0.0).
    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local", "--yes"])
        .args(["clean", "demo", "--keep", "1"])
        .assert()
        .success();
    assert!(target.path().join("demo").join("dist").join("1.0.0").exists());
    assert!(target.path().join("demo").join("dist").join("3.0.0").exists());
    assert!(!target.path().join("demo").join("dist").join("2.0.0").exists());
}

#[test]
fn show_reports_no_active_version_before_activation() {
    let target = tempfile::tempdir().unwrap();
    let src = make_source_pkg("1.0.0");

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["install", src.path().to_str().unwrap()])
        .assert()
        .success();

    Command::cargo_bin("appdeploy")
        .unwrap()
        .args(["-t", target.path().to_str().unwrap(), "--local"])
        .args(["show", "demo"])
        .assert()
        .failure();
}
