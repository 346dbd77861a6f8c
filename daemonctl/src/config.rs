//! `conf.toml` resolution plus the `DAEMONCTL_<APP>_<KEY>` override layer.
//! The schema itself lives in `appdeploy_common::config` so the deployer
//! and controller never drift; this module only adds the env-override
//! pass documented in the per-app environment variable table.

use appdeploy_common::config::Config;

use crate::app::AppPaths;
use crate::error::Result;

/// Load `run/conf.toml` (defaults if absent) and apply this app's
/// `DAEMONCTL_<APP>_<KEY>` overrides.
pub fn load(app: &AppPaths) -> Result<Config> {
    let mut cfg = Config::load(&app.conf_path())?;
    apply_env_overrides(&mut cfg, &app.name);
    Ok(cfg)
}

/// Upper-snake-case an app name the same way the env var prefix is built:
/// non-alphanumeric runs become a single underscore.
fn env_prefix(app_name: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = false;
    for ch in app_name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    format!("DAEMONCTL_{out}_")
}

fn env_var(prefix: &str, key: &str) -> Option<String> {
    std::env::var(format!("{prefix}{}", key.to_uppercase())).ok()
}

/// Apply the recognized per-app override keys: user, group, memory_limit,
/// cpu_limit, file_limit, process_limit, timeout, sandbox, log_level,
/// log_file, monitoring_enabled, check_interval.
pub fn apply_env_overrides(cfg: &mut Config, app_name: &str) {
    let prefix = env_prefix(app_name);

    if let Some(v) = env_var(&prefix, "user") {
        cfg.security.user = v;
    }
    if let Some(v) = env_var(&prefix, "group") {
        cfg.security.group = v;
    }
    if let Some(v) = env_var(&prefix, "memory_limit") {
        cfg.limits.memory_limit = v;
    }
    if let Some(v) = env_var(&prefix, "cpu_limit") {
        if let Ok(n) = v.parse() {
            cfg.limits.cpu_limit = n;
        }
    }
    if let Some(v) = env_var(&prefix, "file_limit") {
        if let Ok(n) = v.parse() {
            cfg.limits.file_limit = n;
        }
    }
    if let Some(v) = env_var(&prefix, "process_limit") {
        if let Ok(n) = v.parse() {
            cfg.limits.process_limit = n;
        }
    }
    if let Some(v) = env_var(&prefix, "timeout") {
        if let Ok(n) = v.parse() {
            cfg.limits.timeout = n;
        }
    }
    if let Some(v) = env_var(&prefix, "sandbox") {
        cfg.sandbox.kind = v;
    }
    if let Some(v) = env_var(&prefix, "log_level") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_var(&prefix, "log_file") {
        cfg.logging.file = v;
    }
    if let Some(v) = env_var(&prefix, "monitoring_enabled") {
        cfg.monitoring.enabled = matches!(v.as_str(), "1" | "true" | "yes");
    }
    if let Some(v) = env_var(&prefix, "check_interval") {
        if let Ok(n) = v.parse() {
            cfg.monitoring.check_interval = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_upper_snake_cases_app_name() {
        assert_eq!(env_prefix("my-app"), "DAEMONCTL_MY_APP_");
        assert_eq!(env_prefix("svc"), "DAEMONCTL_SVC_");
    }

    #[test]
    fn override_replaces_config_field() {
        // SAFETY: test runs single-threaded w.r.t. this var; scoped set/unset.
        unsafe {
            std::env::set_var("DAEMONCTL_SVC_LOG_LEVEL", "debug");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg, "svc");
        assert_eq!(cfg.logging.level, "debug");
        unsafe {
            std::env::remove_var("DAEMONCTL_SVC_LOG_LEVEL");
        }
    }
}
