//! Bootstrap installer: syncs `daemonctl`, the foreground-runner, and the
//! log-tee program into `<target>/bin/`. Grounded on
//! `appdeploy_target_bootstrap` / `_get_remote_checksum` /
//! `_compute_file_checksum` in `original_source/appdeploy.py`, reusing
//! `appdeploy_common::checksum` for the checksum algorithm cascade.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use appdeploy_common::checksum::{self, ChecksumAlgorithm};

use crate::error::{AppDeployError, Result};
use crate::executor::{ExecOptions, TargetExecutor};
use crate::output::Output;
use crate::target::Target;

const TOOL_NAMES: [&str; 3] = ["daemonctl", "foreground-runner", "log-tee"];

#[derive(Debug, Clone)]
pub struct ToolSources {
    pub daemonctl: PathBuf,
    pub foreground_runner: PathBuf,
    pub log_tee: PathBuf,
}

impl ToolSources {
    /// Sibling executables next to the running `appdeploy` binary, unless
    /// a `tools_path` override directory is given.
    pub fn resolve(tools_path: Option<&Path>) -> Result<Self> {
        let base = match tools_path {
            Some(p) => p.to_path_buf(),
            None => std::env::current_exe()?
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        Ok(ToolSources {
            daemonctl: base.join("daemonctl"),
            foreground_runner: base.join("foreground-runner"),
            log_tee: base.join("log-tee"),
        })
    }

    fn entries(&self) -> [(&'static str, &Path); 3] {
        [
            ("daemonctl", &self.daemonctl),
            ("foreground-runner", &self.foreground_runner),
            ("log-tee", &self.log_tee),
        ]
    }
}

/// Install or refresh tools on `target`. Returns `true` if the tools are
/// (now) up-to-date, `false` if `check_only` found stale tools without
/// updating them.
pub fn bootstrap(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    sources: &ToolSources,
    force: bool,
    check_only: bool,
    upgrade: bool,
) -> Result<bool> {
    let bin_dir = format!("{}/bin", target.base_path().display());

    for (_name, src) in sources.entries() {
        if !src.exists() {
            return Err(AppDeployError::Input(format!(
                "bundled tool not found: {}",
                src.display()
            )));
        }
    }

    let status = Output::delayed_status("Checking tools...", Duration::from_secs(1));
    let mut to_update: Vec<(&'static str, &Path)> = Vec::new();
    for (name, src) in sources.entries() {
        let tool_path = format!("{bin_dir}/{name}");
        match remote_checksum(executor, target, &tool_path)? {
            None => {
                Output::verbose(&format!("Tool missing: {name}"));
                to_update.push((name, src));
            }
            Some((remote_sum, algorithm)) => {
                if force || upgrade {
                    Output::verbose(&format!("Tool force update: {name}"));
                    to_update.push((name, src));
                } else {
                    let local_sum = local_checksum(src, algorithm)?;
                    if local_sum != remote_sum {
                        Output::verbose(&format!("Tool outdated: {name}"));
                        to_update.push((name, src));
                    } else {
                        Output::verbose(&format!("Tool up-to-date: {name}"));
                    }
                }
            }
        }
    }
    status.finish();

    if to_update.is_empty() {
        Output::verbose("All tools up-to-date");
        return Ok(true);
    }

    if check_only {
        return Ok(false);
    }

    Output::info(&format!("Updating tools in {bin_dir}"));
    executor.mkdir(target, &bin_dir)?;

    for (name, src) in to_update {
        let tool_path = format!("{bin_dir}/{name}");
        Output::verbose(&format!("Installing {name}"));
        executor.copy(target, src, &tool_path)?;
        executor.run(
            target,
            &format!("chmod +x {}", shlex::quote(&tool_path)),
            &ExecOptions::default(),
        )?;
    }

    let _ = TOOL_NAMES;
    Ok(true)
}

/// Tries `sha256sum`, then `openssl sha256`, then `md5sum`, stopping at the
/// first one that produces output — mirrors `_get_remote_checksum`'s
/// sequential probing instead of running all three unconditionally.
fn remote_checksum(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    path: &str,
) -> Result<Option<(String, ChecksumAlgorithm)>> {
    let sha256 = run_checksum_probe(executor, target, &format!("sha256sum {} 2>/dev/null", shlex::quote(path)));
    if let Some(result) = checksum::parse_remote_checksum(sha256.as_deref(), None, None) {
        return Ok(Some(result));
    }

    let openssl = run_checksum_probe(
        executor,
        target,
        &format!("openssl sha256 {} 2>/dev/null", shlex::quote(path)),
    );
    if let Some(result) = checksum::parse_remote_checksum(None, openssl.as_deref(), None) {
        return Ok(Some(result));
    }

    let md5 = run_checksum_probe(executor, target, &format!("md5sum {} 2>/dev/null", shlex::quote(path)));
    Ok(checksum::parse_remote_checksum(None, None, md5.as_deref()))
}

fn run_checksum_probe(executor: &Arc<dyn TargetExecutor>, target: &Target, command: &str) -> Option<String> {
    executor
        .run(target, command, &ExecOptions::no_check())
        .ok()
        .filter(|r| r.ok())
        .map(|r| r.stdout)
}

fn local_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    Ok(match algorithm {
        ChecksumAlgorithm::Sha256 => checksum::sha256_file(path)?,
        ChecksumAlgorithm::Md5 => checksum::md5_file(path)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RealExecutor;

    fn make_tool(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\necho {name}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
        }
        path
    }

    #[test]
    fn installs_missing_tools_and_is_idempotent() {
        let src_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let sources = ToolSources {
            daemonctl: make_tool(src_dir.path(), "daemonctl"),
            foreground_runner: make_tool(src_dir.path(), "foreground-runner"),
            log_tee: make_tool(src_dir.path(), "log-tee"),
        };
        let executor: Arc<dyn TargetExecutor> = Arc::new(RealExecutor::new(vec![]));
        let target = Target::Local {
            path: target_dir.path().to_path_buf(),
        };

        let updated = bootstrap(&executor, &target, &sources, false, false, false).unwrap();
        assert!(updated);
        assert!(target_dir.path().join("bin").join("daemonctl").exists());

        let second = bootstrap(&executor, &target, &sources, false, false, false).unwrap();
        assert!(second);
    }

    #[test]
    fn check_only_reports_without_installing() {
        let src_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let sources = ToolSources {
            daemonctl: make_tool(src_dir.path(), "daemonctl"),
            foreground_runner: make_tool(src_dir.path(), "foreground-runner"),
            log_tee: make_tool(src_dir.path(), "log-tee"),
        };
        let executor: Arc<dyn TargetExecutor> = Arc::new(RealExecutor::new(vec![]));
        let target = Target::Local {
            path: target_dir.path().to_path_buf(),
        };

        let up_to_date = bootstrap(&executor, &target, &sources, false, true, false).unwrap();
        assert!(!up_to_date);
        assert!(!target_dir.path().join("bin").join("daemonctl").exists());
    }
}
