//! App discovery convention: `${DAEMONCTL_PATH}/${name}/run/` holding
//! `conf.toml`, `env.sh`, `run[.sh]`, `check[.sh]`, `on-start[.sh]`,
//! `on-stop[.sh]`, and the `.pid`/`.version` sentinels written by the
//! deployer's activator. Grounded on the header comment and `_find_tool`-
//! style base-path resolution in `original_source/daemonctl.py`.

use std::path::{Path, PathBuf};

use crate::error::{DaemonCtlError, Result};

/// Resolves `DAEMONCTL_PATH`, defaulting to the current directory — same
/// precedence as the original script.
pub fn base_path() -> PathBuf {
    std::env::var("DAEMONCTL_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_default())
}

/// Resolved paths for one app's `run/` directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub name: String,
    pub app_dir: PathBuf,
    pub run_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        let app_dir = base.join(&name);
        let run_dir = app_dir.join("run");
        Self { name, app_dir, run_dir }
    }

    pub fn resolve(name: impl Into<String>) -> Self {
        Self::new(&base_path(), name)
    }

    pub fn conf_path(&self) -> PathBuf {
        self.run_dir.join("conf.toml")
    }

    pub fn env_script(&self) -> Option<PathBuf> {
        existing(&self.run_dir, "env.sh")
    }

    /// The app's required entry point: `run` or `run.sh`.
    pub fn run_script(&self) -> Result<PathBuf> {
        existing(&self.run_dir, "run")
            .or_else(|| existing(&self.run_dir, "run.sh"))
            .ok_or_else(|| DaemonCtlError::Input(format!("{}: no run/run.sh in {}", self.name, self.run_dir.display())))
    }

    pub fn check_script(&self) -> Option<PathBuf> {
        existing(&self.run_dir, "check").or_else(|| existing(&self.run_dir, "check.sh"))
    }

    pub fn on_start_hook(&self) -> Option<PathBuf> {
        existing(&self.run_dir, "on-start").or_else(|| existing(&self.run_dir, "on-start.sh"))
    }

    pub fn on_stop_hook(&self) -> Option<PathBuf> {
        existing(&self.run_dir, "on-stop").or_else(|| existing(&self.run_dir, "on-stop.sh"))
    }

    pub fn version_marker(&self) -> PathBuf {
        self.run_dir.join(".version")
    }

    pub fn default_pidfile(&self) -> PathBuf {
        self.run_dir.join(".pid")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.run_dir.join("logs")
    }

    pub fn version(&self) -> Option<String> {
        std::fs::read_to_string(self.version_marker())
            .ok()
            .map(|s| s.trim().to_string())
    }
}

fn existing(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_script_prefers_extensionless() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("myapp").join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("run"), "#!/bin/sh\n").unwrap();
        std::fs::write(run_dir.join("run.sh"), "#!/bin/sh\n").unwrap();

        let app = AppPaths::new(dir.path(), "myapp");
        assert_eq!(app.run_script().unwrap(), run_dir.join("run"));
    }

    #[test]
    fn run_script_missing_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("myapp").join("run")).unwrap();
        let app = AppPaths::new(dir.path(), "myapp");
        assert!(app.run_script().is_err());
    }

    #[test]
    fn version_reads_marker() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("myapp").join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join(".version"), "2.1\n").unwrap();
        let app = AppPaths::new(dir.path(), "myapp");
        assert_eq!(app.version(), Some("2.1".to_string()));
    }
}
