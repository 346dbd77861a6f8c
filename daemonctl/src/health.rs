//! Health check resolution and execution, used both by the supervisor's
//! periodic inner-loop poll and (indirectly, via the deployer) by the
//! one-shot probe. Grounded on §4.G "Health check source" / "One-shot
//! health probe".

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use wait_timeout::ChildExt;

use appdeploy_common::config::Config;

use crate::app::AppPaths;

#[derive(Debug, Clone)]
pub enum HealthCheck {
    Command(String),
    Script(PathBuf),
}

/// Either a configured command, or a `check`/`check.sh` script next to the
/// run script. Absent both, `None` — "no check configured".
pub fn resolve(app: &AppPaths, cfg: &Config) -> Option<HealthCheck> {
    if !cfg.monitoring.check_command.is_empty() {
        return Some(HealthCheck::Command(cfg.monitoring.check_command.clone()));
    }
    app.check_script().map(HealthCheck::Script)
}

/// Run the check once, bounded by `timeout`. A timeout or nonzero exit is
/// "unhealthy".
pub fn run_once(check: &HealthCheck, timeout: Duration, working_dir: &Path) -> bool {
    let mut cmd = match check {
        HealthCheck::Command(command) => {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        }
        HealthCheck::Script(path) => Command::new(path),
    };
    cmd.current_dir(working_dir);

    let Ok(mut child) = cmd.spawn() else {
        return false;
    };
    match child.wait_timeout(timeout) {
        Ok(Some(status)) => status.success(),
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            false
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_configured_command_over_script() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("myapp").join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("check.sh"), "#!/bin/sh\nexit 0\n").unwrap();
        let app = AppPaths::new(dir.path(), "myapp");

        let mut cfg = Config::default();
        cfg.monitoring.check_command = "true".into();
        match resolve(&app, &cfg) {
            Some(HealthCheck::Command(c)) => assert_eq!(c, "true"),
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn resolve_is_none_without_command_or_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("myapp").join("run")).unwrap();
        let app = AppPaths::new(dir.path(), "myapp");
        assert!(resolve(&app, &Config::default()).is_none());
    }

    #[test]
    fn run_once_true_command_succeeds() {
        let check = HealthCheck::Command("true".into());
        assert!(run_once(&check, Duration::from_secs(5), Path::new("/")));
    }

    #[test]
    fn run_once_false_command_fails() {
        let check = HealthCheck::Command("false".into());
        assert!(!run_once(&check, Duration::from_secs(5), Path::new("/")));
    }

    #[test]
    fn run_once_times_out_on_slow_command() {
        let check = HealthCheck::Command("sleep 5".into());
        assert!(!run_once(&check, Duration::from_millis(100), Path::new("/")));
    }
}
