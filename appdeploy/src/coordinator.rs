//! Deployment coordinator: install/uninstall a version, and drive the
//! upgrade state machine (install -> stop -> activate -> start -> health
//! -> rollback-on-failure). Grounded on `appdeploy_target_install`,
//! `_do_install`, `appdeploy_target_uninstall`, `appdeploy_cmd_upgrade`,
//! and `appdeploy_cmd_rollback` in `original_source/appdeploy.py`.

use std::sync::Arc;
use std::time::Duration;

use appdeploy_common::archive::ArchiveKind;

use crate::activate::{self, ActivateOutcome};
use crate::daemon_client::{self, StartOptions, StopOptions};
use crate::error::{AppDeployError, Result};
use crate::executor::{ExecOptions, TargetExecutor};
use crate::health;
use crate::layout::Layout;
use crate::output::{OpLog, Output};
use crate::package::Package;
use crate::target::Target;

/// Upload (packaging a directory first, if needed) and unpack an archive
/// into `dist/<version>`, then optionally activate and clean.
pub fn install(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    pkg: &Package,
    layout: &Layout,
    activate_after: bool,
    keep: u32,
    oplog: &OpLog,
) -> Result<()> {
    let packages_dir = layout.packages_dir();
    let dist_dir = layout.dist_dir();
    let version_dir = layout.version_dir(&pkg.version);

    executor.mkdir(target, &packages_dir)?;
    executor.mkdir(target, &dist_dir)?;

    if pkg.is_archive {
        do_install(executor, target, pkg, &pkg.path, &packages_dir, &version_dir, oplog)?;
    } else {
        oplog.log(&format!("Packaging {}", pkg.name), None);
        let tmp = tempfile::tempdir()?;
        let archive_path = tmp.path().join(format!("{}-{}.tar.gz", pkg.name, pkg.version));
        pkg.create_archive(Some(archive_path.clone()), ArchiveKind::Gz, &[], false)?;
        do_install(executor, target, pkg, &archive_path, &packages_dir, &version_dir, oplog)?;
    }

    if activate_after {
        activate::activate(executor, target, layout, Some(&pkg.version), oplog)?;
    }

    if keep > 0 {
        layout.clean(keep)?;
    }

    Ok(())
}

fn do_install(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    _pkg: &Package,
    archive_path: &std::path::Path,
    packages_dir: &str,
    version_dir: &str,
    oplog: &OpLog,
) -> Result<()> {
    let archive_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let remote_archive = format!("{packages_dir}/{archive_name}");

    oplog.log(&format!("Uploading {archive_name}"), None);
    executor.copy(target, archive_path, &remote_archive)?;

    oplog.log(&format!("Extracting to {version_dir}"), None);
    executor.mkdir(target, version_dir)?;

    let tar_flag = if archive_name.ends_with(".tar.gz") || archive_name.ends_with(".tgz") {
        "z"
    } else if archive_name.ends_with(".tar.bz2") {
        "j"
    } else if archive_name.ends_with(".tar.xz") {
        "J"
    } else {
        ""
    };

    executor.run(
        target,
        &format!(
            "tar -x{tar_flag}f {} -C {} --strip-components=0",
            shlex::quote(&remote_archive),
            shlex::quote(version_dir)
        ),
        &ExecOptions::default(),
    )?;
    Ok(())
}

pub struct UninstallOptions {
    pub version: Option<String>,
    pub all_versions: bool,
    pub keep_data: bool,
    pub keep_logs: bool,
}

pub fn uninstall(executor: &Arc<dyn TargetExecutor>, target: &Target, layout: &Layout, opts: &UninstallOptions) -> Result<()> {
    let app_dir = layout.app_dir();
    let run_dir = layout.run_dir();

    if opts.all_versions {
        if executor.exists(target, &format!("{run_dir}/.version"))? {
            return Err(AppDeployError::StatePrecondition(format!(
                "cannot uninstall {}: app is active. Deactivate first",
                layout.name
            )));
        }

        if opts.keep_data || opts.keep_logs {
            for subdir in ["packages", "dist", "run"] {
                executor.rm(target, &format!("{app_dir}/{subdir}"), true)?;
            }
            if !opts.keep_data {
                executor.rm(target, &format!("{app_dir}/data"), true)?;
                executor.rm(target, &format!("{app_dir}/conf"), true)?;
            }
            if !opts.keep_logs {
                executor.rm(target, &format!("{app_dir}/logs"), true)?;
            }
        } else {
            executor.rm(target, &app_dir, true)?;
        }
        return Ok(());
    }

    let version = opts
        .version
        .as_ref()
        .ok_or_else(|| AppDeployError::Input("version required for uninstall (or use --all)".to_string()))?;

    if executor.exists(target, &format!("{run_dir}/.version"))? {
        let active = executor.read(target, &format!("{run_dir}/.version"))?.trim().to_string();
        if &active == version {
            return Err(AppDeployError::StatePrecondition(format!(
                "cannot uninstall {}:{version}: version is active. Deactivate first",
                layout.name
            )));
        }
    }

    executor.rm(target, &layout.version_dir(version), true)?;
    for ext in [".tar.gz", ".tar.bz2", ".tar.xz"] {
        let archive = format!("{}/{}-{version}{ext}", layout.packages_dir(), layout.name);
        if executor.exists(target, &archive)? {
            executor.rm(target, &archive, false)?;
        }
    }
    Ok(())
}

pub struct UpgradeOptions {
    pub keep: u32,
    pub rollback_on_fail: bool,
    pub health_timeout: Duration,
    pub startup_grace: Duration,
}

/// S0 (read prior state) -> S1 install -> S2 stop -> S3 activate -> S4
/// start -> S5 health -> S6 success, or Sf rollback. S1/S3 failures abort
/// outright; S2 failure warns and continues; S4/S5 failures roll back to
/// the previous version when one exists and `rollback_on_fail` is set.
pub fn upgrade(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    pkg: &Package,
    layout: &Layout,
    opts: &UpgradeOptions,
    oplog: &OpLog,
) -> Result<bool> {
    let run_dir = layout.run_dir();

    // S0
    let previous_version = if executor.exists(target, &format!("{run_dir}/.version"))? {
        Some(executor.read(target, &format!("{run_dir}/.version"))?.trim().to_string())
    } else {
        None
    };
    let was_running = executor.exists(target, &format!("{run_dir}/.pid"))?;

    oplog.log(&format!("Upgrading {} to {}", pkg.name, pkg.version), Some(&pkg.version));

    // S1: install (abort on failure)
    install(executor, target, pkg, layout, false, opts.keep, oplog)?;

    // S2: stop if running (warn-and-continue)
    if was_running {
        let stop_opts = StopOptions {
            timeout: 30,
            wait: true,
            ..Default::default()
        };
        if daemon_client::stop(executor, target, layout, &stop_opts, oplog).is_err() {
            Output::warn("Failed to stop gracefully, continuing...");
        }
    }

    // S3: activate new version (abort on failure)
    activate::activate(executor, target, layout, Some(&pkg.version), oplog)?;

    // S4: start new version
    let start_opts = StartOptions {
        wait: true,
        timeout: opts.startup_grace.as_secs(),
        ..Default::default()
    };
    if let Err(e) = daemon_client::start(executor, target, layout, &start_opts, oplog) {
        Output::error(&format!("Failed to start: {e}"));
        if opts.rollback_on_fail {
            if let Some(previous) = &previous_version {
                rollback_to(executor, target, layout, previous, was_running, oplog)?;
            }
        }
        return Ok(false);
    }

    // S5: health check
    if !health::health_check(executor, target, layout, opts.health_timeout, opts.startup_grace)? {
        if opts.rollback_on_fail {
            if let Some(previous) = &previous_version {
                oplog.log(&format!("Rolling back to {previous}"), Some(previous));
                let stop_opts = StopOptions {
                    force: true,
                    ..Default::default()
                };
                let _ = daemon_client::stop(executor, target, layout, &stop_opts, oplog);
                activate::activate(executor, target, layout, Some(previous), oplog)?;
                if was_running {
                    daemon_client::start(executor, target, layout, &StartOptions::default(), oplog)?;
                }
                oplog.log(&format!("Rolled back to {previous}"), Some(previous));
            }
        }
        return Ok(false);
    }

    // S6: success
    oplog.log(&format!("Upgrade to {} successful", pkg.version), Some(&pkg.version));
    Ok(true)
}

fn rollback_to(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    previous: &str,
    was_running: bool,
    oplog: &OpLog,
) -> Result<()> {
    oplog.log(&format!("Rolling back to {previous}"), Some(previous));
    activate::activate(executor, target, layout, Some(previous), oplog)?;
    if was_running {
        daemon_client::start(executor, target, layout, &StartOptions::default(), oplog)?;
    }
    Ok(())
}

/// Roll back to the previous (or an explicitly named) version. Stops the
/// app first if running, and restarts it unless `no_restart` is set.
pub fn rollback(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    to_version: Option<&str>,
    no_restart: bool,
    oplog: &OpLog,
) -> Result<ActivateOutcome> {
    let to_version = match to_version {
        Some(v) => v.to_string(),
        None => layout
            .previous_version()?
            .ok_or_else(|| AppDeployError::StatePrecondition(format!("no previous version available for {}", layout.name)))?,
    };

    let run_dir = layout.run_dir();
    let was_running = executor.exists(target, &format!("{run_dir}/.pid"))?;

    oplog.log(&format!("Rolling back {} to {to_version}", layout.name), Some(&to_version));

    if was_running {
        let stop_opts = StopOptions {
            force: true,
            ..Default::default()
        };
        daemon_client::stop(executor, target, layout, &stop_opts, oplog)?;
    }

    let outcome = activate::activate(executor, target, layout, Some(&to_version), oplog)?;

    if was_running && !no_restart {
        daemon_client::start(executor, target, layout, &StartOptions::default(), oplog)?;
    }

    oplog.log(&format!("Rolled back to {to_version}"), Some(&to_version));
    Ok(outcome)
}
