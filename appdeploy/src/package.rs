//! Package resolution: turning a directory or archive path into a named,
//! versioned, config-carrying [`Package`]. Grounded on
//! `appdeploy_package_resolve_name/_resolve_version/_parse_archive/
//! _load_config/_load/_validate/_create` in
//! `original_source/appdeploy.py`, reusing `appdeploy_common::archive` for
//! the filename grammar and archive I/O.

use std::path::{Path, PathBuf};

use appdeploy_common::archive::{self, ArchiveKind};
use appdeploy_common::config::Config;

use crate::error::{AppDeployError, Result};
use crate::output::Output;

/// Severity of a single [`Package::validate`] finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub is_archive: bool,
    pub config: Config,
}

impl Package {
    /// Load from a directory or archive path, resolving name/version via
    /// CLI override -> `conf.toml` -> directory/VERSION-file/git -> archive
    /// filename, in that order.
    pub fn load(
        path: &Path,
        cli_name: Option<&str>,
        cli_version: Option<&str>,
    ) -> Result<Self> {
        if !path.exists() {
            return Err(AppDeployError::Input(format!(
                "package path not found: {}",
                path.display()
            )));
        }

        let is_archive = !path.is_dir();
        let config = load_config(path)?;
        let name = resolve_name(path, &config, cli_name)?;
        let version = resolve_version(path, &config, cli_version)?;

        Ok(Package {
            name,
            version,
            path: path.to_path_buf(),
            is_archive,
            config,
        })
    }

    /// Structural validation: `run`/`run.sh` present and executable,
    /// `conf.toml` parses, `env.sh` has valid shell syntax, no forbidden
    /// paths. Returns every finding with its severity; in `strict` mode
    /// warnings are promoted to errors. Rendering findings to the user is
    /// the caller's job, not this function's.
    pub fn validate(&self, strict: bool) -> Result<Vec<(Severity, String)>> {
        if self.is_archive {
            let tmp = tempfile::tempdir()?;
            archive::extract_archive(&self.path, tmp.path(), 0)
                .map_err(|e| AppDeployError::Input(e.to_string()))?;
            let entries: Vec<_> = std::fs::read_dir(tmp.path())?
                .filter_map(|e| e.ok())
                .collect();
            if entries.len() == 1 && entries[0].path().is_dir() {
                check_dir(&entries[0].path(), strict)
            } else {
                check_dir(tmp.path(), strict)
            }
        } else {
            check_dir(&self.path, strict)
        }
    }

    /// Package a directory into an archive. Errors if called on an
    /// already-archived package.
    pub fn create_archive(
        &self,
        output: Option<PathBuf>,
        kind: ArchiveKind,
        extra_excludes: &[String],
        dry_run: bool,
    ) -> Result<PathBuf> {
        if self.is_archive {
            return Err(AppDeployError::Input(
                "cannot create archive from archive".to_string(),
            ));
        }

        let output = output.unwrap_or_else(|| {
            PathBuf::from(format!(
                "{}-{}{}",
                self.name,
                self.version,
                kind.extension()
            ))
        });

        Output::verbose(&format!("Creating archive: {}", output.display()));

        if dry_run {
            Output::dry_run(&format!("Would create archive: {}", output.display()));
            return Ok(output);
        }

        archive::create_archive(&self.path, &output, kind, extra_excludes)
            .map_err(|e| AppDeployError::Input(e.to_string()))?;
        Ok(output)
    }
}

fn resolve_name(path: &Path, config: &Config, cli_name: Option<&str>) -> Result<String> {
    if let Some(name) = cli_name {
        return Ok(name.to_string());
    }
    if !config.package.name.is_empty() {
        return Ok(config.package.name.clone());
    }
    if path.is_dir() {
        return Ok(path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default());
    }
    let filename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let (name, _version) = archive::parse_archive_name(&filename)
        .map_err(|e| AppDeployError::Input(e.to_string()))?;
    Ok(name)
}

fn resolve_version(path: &Path, config: &Config, cli_version: Option<&str>) -> Result<String> {
    if let Some(version) = cli_version {
        return Ok(version.to_string());
    }
    if !config.package.version.is_empty() {
        return Ok(config.package.version.clone());
    }
    if path.is_dir() {
        let version_file = path.join("VERSION");
        if version_file.exists() {
            return Ok(std::fs::read_to_string(version_file)?.trim().to_string());
        }
        if let Ok(output) = std::process::Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .current_dir(path)
            .output()
        {
            if output.status.success() {
                let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !hash.is_empty() {
                    return Ok(hash);
                }
            }
        }
        return Err(AppDeployError::Input(format!(
            "cannot determine version for {}. Use --release, add [package] version to conf.toml, or create a VERSION file",
            path.display()
        )));
    }
    let filename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let (_name, version) = archive::parse_archive_name(&filename)
        .map_err(|e| AppDeployError::Input(e.to_string()))?;
    Ok(version)
}

fn load_config(path: &Path) -> Result<Config> {
    if path.is_dir() {
        return Ok(Config::load(&path.join("conf.toml"))?);
    }
    match archive::read_member(path, "conf.toml") {
        Ok(Some(content)) => {
            let text = String::from_utf8_lossy(&content).to_string();
            Ok(Config::parse(&text)?)
        }
        Ok(None) | Err(_) => Ok(Config::default()),
    }
}

fn check_dir(base: &Path, strict: bool) -> Result<Vec<(Severity, String)>> {
    let mut findings = Vec::new();

    let run_script = ["run", "run.sh"]
        .iter()
        .map(|n| base.join(n))
        .find(|p| p.exists());
    match &run_script {
        None => findings.push((Severity::Error, "missing required 'run' or 'run.sh' script".to_string())),
        Some(script) => {
            if !is_executable(script) {
                findings.push((
                    Severity::Error,
                    format!("'{}' is not executable", script.file_name().unwrap().to_string_lossy()),
                ));
            }
        }
    }

    let conf_file = base.join("conf.toml");
    if conf_file.exists() {
        let content = std::fs::read_to_string(&conf_file)?;
        if let Err(e) = Config::parse(&content) {
            findings.push((Severity::Error, format!("invalid conf.toml: {e}")));
        }
    }

    let env_file = base.join("env.sh");
    if env_file.exists() {
        let result = std::process::Command::new("sh")
            .args(["-n", env_file.to_str().unwrap_or_default()])
            .output();
        if let Ok(result) = result {
            if !result.status.success() {
                findings.push((
                    Severity::Error,
                    format!("invalid shell syntax in env.sh: {}", String::from_utf8_lossy(&result.stderr).trim()),
                ));
            }
        }
    }

    let forbidden = [".git", "__pycache__", ".env"];
    let warning_severity = if strict { Severity::Error } else { Severity::Warning };
    for entry in walkdir::WalkDir::new(base).into_iter().filter_map(|e| e.ok()) {
        let rel = entry.path().strip_prefix(base).unwrap_or(entry.path());
        let rel_str = rel.to_string_lossy();
        for pattern in forbidden {
            if rel_str.contains(pattern) {
                findings.push((warning_severity, format!("forbidden path found: {rel_str}")));
                break;
            }
        }
        if entry.path().extension().map(|e| e == "pyc").unwrap_or(false) {
            findings.push((warning_severity, format!("compiled Python file found: {rel_str}")));
        }
    }

    Ok(findings)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_pkg_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("run"), "#!/bin/sh\necho hi\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(dir.path().join("run")).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(dir.path().join("run"), perms).unwrap();
        }
        fs::write(dir.path().join("VERSION"), "1.2.3\n").unwrap();
        dir
    }

    #[test]
    fn resolves_name_from_directory_basename() {
        let dir = make_pkg_dir();
        let pkg = Package::load(dir.path(), None, None).unwrap();
        assert_eq!(pkg.version, "1.2.3");
        assert!(!pkg.is_archive);
    }

    #[test]
    fn cli_overrides_win() {
        let dir = make_pkg_dir();
        let pkg = Package::load(dir.path(), Some("custom"), Some("9.9.9")).unwrap();
        assert_eq!(pkg.name, "custom");
        assert_eq!(pkg.version, "9.9.9");
    }

    #[test]
    fn validate_flags_missing_run_script() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("VERSION"), "1.0\n").unwrap();
        let pkg = Package::load(dir.path(), Some("x"), None).unwrap();
        let errors = pkg.validate(false).unwrap();
        assert!(errors.iter().any(|(_, msg)| msg.contains("run")));
    }

    #[test]
    fn missing_version_without_file_or_git_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("run"), "#!/bin/sh\n").unwrap();
        let result = Package::load(dir.path(), Some("x"), None);
        assert!(result.is_err());
    }
}
