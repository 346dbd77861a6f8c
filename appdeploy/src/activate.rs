//! Atomic activation: stage a new `run/` directory, then swap it in via
//! rename so there is never a moment with a half-built run tree. Grounded
//! on `appdeploy_target_activate` / `_populate_run` / `_deactivate` in
//! `original_source/appdeploy.py`.

use std::sync::Arc;

use crate::error::{AppDeployError, Result};
use crate::executor::{ExecOptions, TargetExecutor};
use crate::layout::Layout;
use crate::output::OpLog;
use crate::target::Target;

/// Build `run.new/`'s layer symlinks: `dist/<version>` then `data/` then
/// `conf/`, each layer overwriting entries the previous layer created,
/// plus a fixed `logs` symlink. Relative targets only, so the tree stays
/// valid if the app directory itself is ever moved.
pub fn populate_run(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    version: &str,
    run_dir: &str,
) -> Result<()> {
    executor.mkdir(target, &layout.logs_dir())?;

    for entry in layout.list_entries(&layout.version_dir(version))? {
        let src = format!("../dist/{version}/{entry}");
        let dst = format!("{run_dir}/{entry}");
        executor.symlink(target, &dst, &src)?;
    }

    for entry in layout.list_entries(&layout.data_dir())? {
        let dst = format!("{run_dir}/{entry}");
        if executor.exists(target, &dst)? {
            executor.rm(target, &dst, false)?;
        }
        executor.symlink(target, &dst, &format!("../data/{entry}"))?;
    }

    for entry in layout.list_entries(&layout.conf_dir())? {
        let dst = format!("{run_dir}/{entry}");
        if executor.exists(target, &dst)? {
            executor.rm(target, &dst, false)?;
        }
        executor.symlink(target, &dst, &format!("../conf/{entry}"))?;
    }

    executor.symlink(target, &format!("{run_dir}/logs"), "../logs")?;
    Ok(())
}

/// Outcome of an activation attempt, reported so callers can decide
/// whether a restart is warranted.
pub struct ActivateOutcome {
    pub version: String,
    pub already_active: bool,
    pub was_running: bool,
}

/// Set the active version for `name` via stage-then-rename. If `version`
/// is `None`, the latest installed version is used.
pub fn activate(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    version: Option<&str>,
    oplog: &OpLog,
) -> Result<ActivateOutcome> {
    let run_dir = layout.run_dir();
    let run_new = format!("{}.new", layout.run_dir());
    let run_old = format!("{}.old", layout.run_dir());

    let version = match version {
        Some(v) => v.to_string(),
        None => layout
            .latest_version()?
            .ok_or_else(|| AppDeployError::StatePrecondition(format!(
                "no versions installed for {}",
                layout.name
            )))?,
    };

    let version_dir = layout.version_dir(&version);
    if !executor.exists(target, &version_dir)? {
        return Err(AppDeployError::StatePrecondition(format!(
            "version {version} not found for {}",
            layout.name
        )));
    }

    let version_marker = format!("{run_dir}/.version");
    let mut was_running = false;
    if executor.exists(target, &version_marker)? {
        let current = executor.read(target, &version_marker)?.trim().to_string();
        if current == version {
            oplog.log(&format!("{}:{version} is already active", layout.name), Some(&version));
            return Ok(ActivateOutcome {
                version,
                already_active: true,
                was_running: false,
            });
        }
        was_running = executor.exists(target, &format!("{run_dir}/.pid"))?;
    }

    oplog.log(&format!("Activating {}", layout.name), Some(&version));

    executor.rm(target, &run_new, true)?;
    executor.mkdir(target, &run_new)?;
    populate_run(executor, target, layout, &version, &run_new)?;

    match target {
        Target::Local { .. } => {
            std::fs::write(format!("{run_new}/.version"), &version)?;
        }
        Target::Remote { .. } => {
            executor.run(
                target,
                &format!(
                    "echo {} > {}",
                    shlex::quote(&version),
                    shlex::quote(&format!("{run_new}/.version"))
                ),
                &ExecOptions::default(),
            )?;
        }
    }

    if executor.exists(target, &run_dir)? {
        executor.rename(target, &run_dir, &run_old)?;
    }
    executor.rename(target, &run_new, &run_dir)?;
    executor.rm(target, &run_old, true)?;

    oplog.log(&format!("Activated {}", layout.name), Some(&version));

    Ok(ActivateOutcome {
        version,
        already_active: false,
        was_running,
    })
}

/// Remove the active `run/` symlink tree. Refuses while the app is running.
pub fn deactivate(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    oplog: &OpLog,
) -> Result<()> {
    let run_dir = layout.run_dir();

    if executor.exists(target, &format!("{run_dir}/.pid"))? {
        return Err(AppDeployError::StatePrecondition(format!(
            "cannot deactivate {}: app is running. Stop it first",
            layout.name
        )));
    }

    let version_marker = format!("{run_dir}/.version");
    if !executor.exists(target, &version_marker)? {
        oplog.log(&format!("{} is not active", layout.name), None);
        return Ok(());
    }
    let version = executor.read(target, &version_marker)?.trim().to_string();

    executor.rm(target, &run_dir, true)?;
    oplog.log(&format!("Deactivated {}", layout.name), Some(&version));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RealExecutor;

    fn setup() -> (tempfile::TempDir, Arc<dyn TargetExecutor>, Target) {
        let dir = tempfile::tempdir().unwrap();
        let executor: Arc<dyn TargetExecutor> = Arc::new(RealExecutor::new(vec![]));
        let target = Target::Local {
            path: dir.path().to_path_buf(),
        };
        (dir, executor, target)
    }

    #[test]
    fn activate_creates_run_with_version_marker() {
        let (dir, executor, target) = setup();
        let app = dir.path().join("myapp");
        std::fs::create_dir_all(app.join("dist").join("1.0")).unwrap();
        std::fs::write(app.join("dist").join("1.0").join("run"), "x").unwrap();

        let layout = Layout::new(Arc::clone(&executor), &target, "myapp");
        let oplog = OpLog::new("local");
        let outcome = activate(&executor, &target, &layout, Some("1.0"), &oplog).unwrap();
        assert!(!outcome.already_active);
        assert_eq!(
            std::fs::read_to_string(app.join("run").join(".version")).unwrap(),
            "1.0"
        );
        assert!(app.join("run").join("logs").exists() || app.join("run").join("logs").symlink_metadata().is_ok());
    }

    #[test]
    fn reactivating_same_version_is_noop() {
        let (dir, executor, target) = setup();
        let app = dir.path().join("myapp");
        std::fs::create_dir_all(app.join("dist").join("1.0")).unwrap();

        let layout = Layout::new(Arc::clone(&executor), &target, "myapp");
        let oplog = OpLog::new("local");
        activate(&executor, &target, &layout, Some("1.0"), &oplog).unwrap();
        let second = activate(&executor, &target, &layout, Some("1.0"), &oplog).unwrap();
        assert!(second.already_active);
    }

    #[test]
    fn deactivate_refuses_while_running() {
        let (dir, executor, target) = setup();
        let app = dir.path().join("myapp");
        std::fs::create_dir_all(app.join("dist").join("1.0")).unwrap();
        let layout = Layout::new(Arc::clone(&executor), &target, "myapp");
        let oplog = OpLog::new("local");
        activate(&executor, &target, &layout, Some("1.0"), &oplog).unwrap();
        std::fs::write(app.join("run").join(".pid"), "123").unwrap();

        let result = deactivate(&executor, &target, &layout, &oplog);
        assert!(result.is_err());
    }
}
