//! On-target layout: listing installed versions, finding the active/
//! latest/previous version, and pruning old ones. Grounded on
//! `appdeploy_target_list`, `_get_latest_version`, `_get_previous_version`,
//! and `appdeploy_target_clean` in `original_source/appdeploy.py`.

use std::sync::Arc;

use crate::error::Result;
use crate::executor::{ExecOptions, TargetExecutor};
use crate::output::Output;
use crate::target::Target;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub name: String,
    pub version: String,
    pub status: VersionStatus,
    pub installed: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    Active,
    Inactive,
}

impl VersionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionStatus::Active => "active",
            VersionStatus::Inactive => "inactive",
        }
    }
}

/// Path accessors and version-inventory queries for one app directory on
/// a target.
pub struct Layout<'a> {
    executor: Arc<dyn TargetExecutor>,
    target: &'a Target,
    pub name: String,
}

impl<'a> Layout<'a> {
    pub fn new(executor: Arc<dyn TargetExecutor>, target: &'a Target, name: impl Into<String>) -> Self {
        Self {
            executor,
            target,
            name: name.into(),
        }
    }

    pub fn app_dir(&self) -> String {
        format!("{}/{}", self.target.base_path().display(), self.name)
    }

    pub fn dist_dir(&self) -> String {
        format!("{}/dist", self.app_dir())
    }

    pub fn version_dir(&self, version: &str) -> String {
        format!("{}/dist/{version}", self.app_dir())
    }

    pub fn data_dir(&self) -> String {
        format!("{}/data", self.app_dir())
    }

    pub fn conf_dir(&self) -> String {
        format!("{}/conf", self.app_dir())
    }

    pub fn logs_dir(&self) -> String {
        format!("{}/logs", self.app_dir())
    }

    pub fn run_dir(&self) -> String {
        format!("{}/run", self.app_dir())
    }

    pub fn packages_dir(&self) -> String {
        format!("{}/packages", self.app_dir())
    }

    /// The version named by `run/.version`, if the run directory is active.
    pub fn active_version(&self) -> Result<Option<String>> {
        let marker = format!("{}/.version", self.run_dir());
        if !self.executor.exists(self.target, &marker)? {
            return Ok(None);
        }
        Ok(Some(self.executor.read(self.target, &marker)?.trim().to_string()))
    }

    fn list_dir_entries(&self, path: &str) -> Result<Vec<String>> {
        if !self.executor.exists(self.target, path)? {
            return Ok(vec![]);
        }
        let result = self.executor.run(
            self.target,
            &format!("ls -1 {}", shlex::quote(path)),
            &ExecOptions::read_only(),
        )?;
        if !result.ok() {
            return Ok(vec![]);
        }
        Ok(result
            .stdout
            .trim()
            .split('\n')
            .filter(|e| !e.is_empty())
            .map(|e| e.to_string())
            .collect())
    }

    fn list_dir_entries_by_mtime(&self, path: &str) -> Result<Vec<String>> {
        if !self.executor.exists(self.target, path)? {
            return Ok(vec![]);
        }
        let result = self.executor.run(
            self.target,
            &format!("ls -1t {}", shlex::quote(path)),
            &ExecOptions::read_only(),
        )?;
        if !result.ok() {
            return Ok(vec![]);
        }
        Ok(result
            .stdout
            .trim()
            .split('\n')
            .filter(|e| !e.is_empty())
            .map(|e| e.to_string())
            .collect())
    }

    pub fn list_entries(&self, path: &str) -> Result<Vec<String>> {
        self.list_dir_entries(path)
    }

    /// Versions installed under `dist/`, in no particular order.
    pub fn list_versions(&self) -> Result<Vec<String>> {
        self.list_dir_entries(&self.dist_dir())
    }

    pub fn latest_version(&self) -> Result<Option<String>> {
        Ok(self.list_dir_entries_by_mtime(&self.dist_dir())?.into_iter().next())
    }

    pub fn previous_version(&self) -> Result<Option<String>> {
        Ok(self.list_dir_entries_by_mtime(&self.dist_dir())?.into_iter().nth(1))
    }

    pub fn is_running(&self) -> Result<bool> {
        self.active_version().map(|v| v.is_some())
    }

    /// Remove inactive versions beyond the most recent `keep`, ordered by
    /// mtime; the active version never counts against the retain budget.
    pub fn clean(&self, keep: u32) -> Result<Vec<String>> {
        if keep == 0 {
            return Ok(vec![]);
        }
        let active = self.active_version()?;
        let versions = self.list_dir_entries_by_mtime(&self.dist_dir())?;
        let mut removed = Vec::new();
        let mut kept = 0u32;

        for ver in versions {
            if Some(&ver) == active.as_ref() {
                continue;
            }
            if kept < keep {
                kept += 1;
                continue;
            }
            let ver_dir = self.version_dir(&ver);
            self.executor.rm(self.target, &ver_dir, true)?;
            for ext in [".tar.gz", ".tar.bz2", ".tar.xz"] {
                let archive = format!("{}/{}-{ver}{ext}", self.packages_dir(), self.name);
                if self.executor.exists(self.target, &archive)? {
                    self.executor.rm(self.target, &archive, false)?;
                }
            }
            Output::verbose(&format!("Removed {}:{ver}", self.name));
            removed.push(ver);
        }

        Ok(removed)
    }
}

/// List all app names under a target's base path, each with an inventory
/// of installed versions and status. Supports glob filtering on `name`.
pub fn list_installed(
    executor: Arc<dyn TargetExecutor>,
    target: &Target,
    name_filter: Option<&str>,
    long_format: bool,
) -> Result<Vec<InstalledVersion>> {
    let mut results = Vec::new();

    let has_glob = name_filter
        .map(|n| n.contains(['*', '?', '[']))
        .unwrap_or(false);

    let app_names: Vec<String> = if let (Some(n), false) = (name_filter, has_glob) {
        vec![n.to_string()]
    } else {
        let listing = executor.run(
            target,
            &format!("ls -1 {}", shlex::quote(&target.base_path().display().to_string())),
            &ExecOptions::read_only(),
        )?;
        if !listing.ok() {
            return Ok(results);
        }
        let mut names: Vec<String> = listing
            .stdout
            .trim()
            .split('\n')
            .filter(|n| !n.is_empty() && *n != "bin")
            .filter(|n| {
                let dist = format!("{}/{n}/dist", target.base_path().display());
                executor.exists(target, &dist).unwrap_or(false)
            })
            .map(|n| n.to_string())
            .collect();
        if has_glob {
            if let Some(pattern) = name_filter.and_then(|p| glob::Pattern::new(p).ok()) {
                names.retain(|n| pattern.matches(n));
            }
        }
        names
    };

    for app_name in app_names {
        let layout = Layout::new(Arc::clone(&executor), target, app_name.clone());
        let active = layout.active_version()?;
        let versions = layout.list_versions()?;

        for ver in versions {
            let status = if Some(&ver) == active.as_ref() {
                VersionStatus::Active
            } else {
                VersionStatus::Inactive
            };

            let (installed, size) = if long_format {
                version_stat(&executor, target, &layout.version_dir(&ver))?
            } else {
                (String::new(), 0)
            };

            results.push(InstalledVersion {
                name: app_name.clone(),
                version: ver,
                status,
                installed,
                size,
            });
        }
    }

    Ok(results)
}

fn version_stat(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    ver_dir: &str,
) -> Result<(String, u64)> {
    let mut installed = String::new();
    let mut size = 0u64;

    let result = executor.run(
        target,
        &format!(
            "stat -c '%Y' {} 2>/dev/null || stat -f '%m' {}",
            shlex::quote(ver_dir),
            shlex::quote(ver_dir)
        ),
        &ExecOptions::no_check(),
    )?;
    if result.ok() {
        if let Ok(ts) = result.stdout.trim().parse::<i64>() {
            if let Some(dt) = chrono::DateTime::from_timestamp(ts, 0) {
                installed = dt.to_rfc3339();
            }
        }
    }

    let result = executor.run(
        target,
        &format!(
            "du -sb {} 2>/dev/null || du -sk {}",
            shlex::quote(ver_dir),
            shlex::quote(ver_dir)
        ),
        &ExecOptions::no_check(),
    )?;
    if result.ok() {
        if let Some(first) = result.stdout.split_whitespace().next() {
            size = first.parse().unwrap_or(0);
        }
    }

    Ok((installed, size))
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

    fn make_version(dir: &std::path::Path, app: &str, version: &str) {
        std::fs::create_dir_all(dir.join(app).join("dist").join(version)).unwrap();
    }

    #[test]
    fn active_version_absent_without_run_marker() {
        let (dir, executor, target) = setup();
        make_version(dir.path(), "myapp", "1.0");
        let layout = Layout::new(executor, &target, "myapp");
        assert_eq!(layout.active_version().unwrap(), None);
    }

    #[test]
    fn active_version_never_counts_against_keep() {
        let (dir, executor, target) = setup();
        for v in ["1.0", "1.1", "1.2", "1.3"] {
            make_version(dir.path(), "myapp", v);
        }
        let run_dir = dir.path().join("myapp").join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join(".version"), "1.0\n").unwrap();

        let layout = Layout::new(executor, &target, "myapp");
        assert_eq!(layout.active_version().unwrap(), Some("1.0".to_string()));

        let versions = layout.list_versions().unwrap();
        assert_eq!(versions.len(), 4);
    }

    #[test]
    fn clean_keeps_zero_removes_nothing() {
        let (dir, executor, target) = setup();
        make_version(dir.path(), "myapp", "1.0");
        let layout = Layout::new(executor, &target, "myapp");
        let removed = layout.clean(0).unwrap();
        assert!(removed.is_empty());
    }
}
