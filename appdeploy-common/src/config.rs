//! `conf.toml` configuration schema, shared between the deployer (which
//! only reads `[package]`) and the daemon controller (which reads every
//! section). Every field has a default so a missing file, or a file
//! missing whole sections, resolves entirely from defaults.

use serde::Deserialize;
use std::path::Path;

use crate::error::CommonError;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PackageSection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonSection {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub foreground: bool,
    pub double_fork: bool,
    pub setsid: bool,
    pub working_directory: String,
    pub umask: String,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            enabled: true,
            foreground: false,
            double_fork: true,
            setsid: true,
            working_directory: String::new(),
            umask: "022".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessSection {
    pub command: String,
    pub args: Vec<String>,
    pub environment: std::collections::BTreeMap<String, String>,
    pub environment_file: String,
    pub clear_env: bool,
    pub priority: i32,
    pub restart: bool,
    pub restart_delay: u64,
    pub restart_max_attempts: u32,
    pub start_timeout: u64,
    pub stop_timeout: u64,
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            environment: Default::default(),
            environment_file: String::new(),
            clear_env: false,
            priority: 0,
            restart: false,
            restart_delay: 5,
            restart_max_attempts: 3,
            start_timeout: 60,
            stop_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecuritySection {
    pub user: String,
    pub group: String,
    pub capabilities_drop: Vec<String>,
    pub capabilities_keep: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSection {
    pub file: String,
    pub level: String,
    pub stdout_file: String,
    pub stderr_file: String,
    pub syslog: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub max_size: String,
    pub max_age: String,
    pub max_count: u32,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            file: String::new(),
            level: "info".to_string(),
            stdout_file: String::new(),
            stderr_file: String::new(),
            syslog: false,
            quiet: false,
            verbose: false,
            max_size: String::new(),
            max_age: String::new(),
            max_count: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PidfileSection {
    pub enabled: bool,
    pub path: String,
}

impl Default for PidfileSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalsSection {
    pub forward_all: bool,
    pub forward_list: Vec<String>,
    pub preserve_signals: Vec<String>,
    pub kill_timeout: u64,
    pub stop_signal: String,
    pub reload_signal: String,
}

impl Default for SignalsSection {
    fn default() -> Self {
        Self {
            forward_all: true,
            forward_list: Vec::new(),
            preserve_signals: Vec::new(),
            kill_timeout: 30,
            stop_signal: "TERM".to_string(),
            reload_signal: "HUP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub profile: String,
    pub private_tmp: bool,
    pub private_dev: bool,
    pub readonly_paths: Vec<String>,
    pub no_network: bool,
    pub seccomp: bool,
    pub seccomp_profile: String,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            kind: "none".to_string(),
            profile: String::new(),
            private_tmp: false,
            private_dev: false,
            readonly_paths: Vec::new(),
            no_network: false,
            seccomp: false,
            seccomp_profile: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsSection {
    pub memory_limit: String,
    pub cpu_limit: u32,
    pub file_limit: u32,
    pub process_limit: u32,
    pub core_limit: String,
    pub stack_limit: String,
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringSection {
    pub enabled: bool,
    pub check_interval: u64,
    pub check_command: String,
    pub check_timeout: u64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub startup_delay: u64,
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval: 30,
            check_command: String::new(),
            check_timeout: 10,
            failure_threshold: 3,
            success_threshold: 1,
            startup_delay: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub package: PackageSection,
    pub daemon: DaemonSection,
    pub process: ProcessSection,
    pub security: SecuritySection,
    pub logging: LoggingSection,
    pub pidfile: PidfileSection,
    pub signals: SignalsSection,
    pub sandbox: SandboxSection,
    pub limits: LimitsSection,
    pub monitoring: MonitoringSection,
}

impl Config {
    /// Parse from a `conf.toml` string. Missing keys and missing sections
    /// resolve to their documented defaults; unknown keys are ignored.
    pub fn parse(content: &str) -> Result<Self, CommonError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a path, returning defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, CommonError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/conf.toml")).unwrap();
        assert_eq!(cfg.monitoring.check_interval, 30);
        assert_eq!(cfg.signals.stop_signal, "TERM");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg = Config::parse(
            r#"
            [package]
            name = "svc"
            version = "1.0"
            bogus = "ignored"

            [monitoring]
            enabled = true
            check_interval = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.package.name, "svc");
        assert!(cfg.monitoring.enabled);
        assert_eq!(cfg.monitoring.check_interval, 5);
        assert_eq!(cfg.monitoring.failure_threshold, 3);
    }

    #[test]
    fn partial_sections_fill_remaining_defaults() {
        let cfg = Config::parse(
            r#"
            [process]
            restart = true
            "#,
        )
        .unwrap();
        assert!(cfg.process.restart);
        assert_eq!(cfg.process.restart_max_attempts, 3);
        assert_eq!(cfg.process.stop_timeout, 30);
    }
}
