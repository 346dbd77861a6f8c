//! Composes the foreground-runner invocation from a resolved `Config` and
//! `AppPaths`, per the daemon controller façade's composition rules:
//! working directory default, stdout/stderr default paths, environment
//! layering, and the log-tee prefix when rotation is requested.
//!
//! Grounded on the flag-building shape of `daemon_client::daemonctl_cmd`
//! in the deployer crate and `bkt::command_runner::CommandOptions`. The
//! foreground-runner and log-tee programs themselves are external
//! collaborators this crate only invokes, never implements.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use appdeploy_common::config::Config;

use crate::app::AppPaths;
use crate::error::Result;

/// Sibling-of-the-running-binary tool resolution, same convention as the
/// deployer's bootstrap tool sources.
pub fn tool_path(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join(name)))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
}

impl Invocation {
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.current_dir(&self.working_dir);
        cmd.env_clear();
        cmd.envs(&self.env);
        cmd
    }
}

/// Source `env.sh` in a subshell and capture the environment it leaves
/// behind, diffed against a clean `env` baseline. Best-effort: a
/// non-executing or failing script yields no additional variables.
fn sourced_env(env_script: &Path) -> BTreeMap<String, String> {
    let marker = "__DAEMONCTL_ENV_MARKER__";
    let script = format!(
        "set -a; . {} >/dev/null 2>&1; echo {marker}; env",
        shlex::quote(&env_script.display().to_string())
    );
    let Ok(output) = Command::new("sh").arg("-c").arg(&script).output() else {
        return BTreeMap::new();
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let after_marker = match text.split_once(marker) {
        Some((_, rest)) => rest,
        None => return BTreeMap::new(),
    };
    after_marker
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build the final environment: inherited, then `env.sh`, then
/// configuration-set variables, then caller-set variables (highest
/// precedence, last-wins).
pub fn resolve_env(app: &AppPaths, cfg: &Config, caller_env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = std::env::vars().collect();

    if let Some(script) = app.env_script() {
        env.extend(sourced_env(&script));
    }

    env.extend(cfg.process.environment.clone());
    env.extend(caller_env.clone());
    env
}

/// Append flags mapping `Config`'s security/sandbox/limits/signals
/// sections to foreground-runner arguments. Empty/default values are
/// omitted so a bare invocation stays readable.
fn append_policy_flags(args: &mut Vec<String>, cfg: &Config) {
    if !cfg.security.user.is_empty() {
        args.push("--user".into());
        args.push(cfg.security.user.clone());
    }
    if !cfg.security.group.is_empty() {
        args.push("--group".into());
        args.push(cfg.security.group.clone());
    }
    for cap in &cfg.security.capabilities_drop {
        args.push("--drop-cap".into());
        args.push(cap.clone());
    }
    for cap in &cfg.security.capabilities_keep {
        args.push("--keep-cap".into());
        args.push(cap.clone());
    }

    if cfg.sandbox.kind != "none" {
        args.push("--sandbox".into());
        args.push(cfg.sandbox.kind.clone());
        if !cfg.sandbox.profile.is_empty() {
            args.push("--sandbox-profile".into());
            args.push(cfg.sandbox.profile.clone());
        }
        if cfg.sandbox.private_tmp {
            args.push("--private-tmp".into());
        }
        if cfg.sandbox.private_dev {
            args.push("--private-dev".into());
        }
        if cfg.sandbox.no_network {
            args.push("--no-network".into());
        }
        if cfg.sandbox.seccomp {
            args.push("--seccomp".into());
            if !cfg.sandbox.seccomp_profile.is_empty() {
                args.push(cfg.sandbox.seccomp_profile.clone());
            }
        }
        for path in &cfg.sandbox.readonly_paths {
            args.push("--readonly-path".into());
            args.push(path.clone());
        }
    }

    if !cfg.limits.memory_limit.is_empty() {
        args.push("--memory-limit".into());
        args.push(cfg.limits.memory_limit.clone());
    }
    if cfg.limits.cpu_limit > 0 {
        args.push("--cpu-limit".into());
        args.push(cfg.limits.cpu_limit.to_string());
    }
    if cfg.limits.file_limit > 0 {
        args.push("--file-limit".into());
        args.push(cfg.limits.file_limit.to_string());
    }
    if cfg.limits.process_limit > 0 {
        args.push("--process-limit".into());
        args.push(cfg.limits.process_limit.to_string());
    }
    if !cfg.limits.core_limit.is_empty() {
        args.push("--core-limit".into());
        args.push(cfg.limits.core_limit.clone());
    }
    if !cfg.limits.stack_limit.is_empty() {
        args.push("--stack-limit".into());
        args.push(cfg.limits.stack_limit.clone());
    }
    if cfg.limits.timeout > 0 {
        args.push("--timeout".into());
        args.push(cfg.limits.timeout.to_string());
    }

    if cfg.signals.forward_all {
        args.push("--forward-all-signals".into());
    }
    for sig in &cfg.signals.forward_list {
        args.push("--forward-signal".into());
        args.push(sig.clone());
    }
    for sig in &cfg.signals.preserve_signals {
        args.push("--preserve-signal".into());
        args.push(sig.clone());
    }
    args.push("--stop-signal".into());
    args.push(cfg.signals.stop_signal.clone());
    args.push("--reload-signal".into());
    args.push(cfg.signals.reload_signal.clone());
    args.push("--kill-timeout".into());
    args.push(cfg.signals.kill_timeout.to_string());

    if cfg.pidfile.enabled {
        args.push("--pidfile-owner".into());
    }
}

/// Build the full `[tee-with-rotation --] foreground-runner -- run-script`
/// invocation for one app.
pub fn build(app: &AppPaths, cfg: &Config, pidfile: &Path, caller_env: &BTreeMap<String, String>) -> Result<Invocation> {
    let run_script = app.run_script()?;
    let working_dir = if !cfg.daemon.working_directory.is_empty() {
        PathBuf::from(&cfg.daemon.working_directory)
    } else {
        run_script.parent().map(Path::to_path_buf).unwrap_or_else(|| app.run_dir.clone())
    };

    let stdout_file = if !cfg.logging.stdout_file.is_empty() {
        PathBuf::from(&cfg.logging.stdout_file)
    } else {
        app.app_dir.join("1.log")
    };
    let stderr_file = if !cfg.logging.stderr_file.is_empty() {
        PathBuf::from(&cfg.logging.stderr_file)
    } else {
        app.app_dir.join("1.err")
    };

    let mut args: Vec<String> = vec!["--pidfile".into(), pidfile.display().to_string()];
    append_policy_flags(&mut args, cfg);
    args.push("--stdout".into());
    args.push(stdout_file.display().to_string());
    args.push("--stderr".into());
    args.push(stderr_file.display().to_string());
    args.push("--".into());
    args.push(run_script.display().to_string());
    args.extend(cfg.process.args.iter().cloned());

    let rotation_requested =
        !cfg.logging.max_size.is_empty() || !cfg.logging.max_age.is_empty() || cfg.logging.max_count > 0;
    let has_output_file = !cfg.logging.file.is_empty() || !cfg.logging.stdout_file.is_empty();

    let (program, args) = if rotation_requested && has_output_file {
        let mut tee_args = vec!["--output".into(), stdout_file.display().to_string()];
        if !cfg.logging.max_size.is_empty() {
            tee_args.push("--max-size".into());
            tee_args.push(cfg.logging.max_size.clone());
        }
        if !cfg.logging.max_age.is_empty() {
            tee_args.push("--max-age".into());
            tee_args.push(cfg.logging.max_age.clone());
        }
        if cfg.logging.max_count > 0 {
            tee_args.push("--max-count".into());
            tee_args.push(cfg.logging.max_count.to_string());
        }
        tee_args.push("--".into());
        tee_args.push(tool_path("foreground-runner").display().to_string());
        tee_args.extend(args);
        (tool_path("log-tee"), tee_args)
    } else {
        (tool_path("foreground-runner"), args)
    };

    Ok(Invocation {
        program,
        args,
        env: resolve_env(app, cfg, caller_env),
        working_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with_run_script(dir: &Path) -> AppPaths {
        let run_dir = dir.join("myapp").join("run");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("run"), "#!/bin/sh\n").unwrap();
        AppPaths::new(dir, "myapp")
    }

    #[test]
    fn build_without_rotation_invokes_foreground_runner_directly() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_run_script(dir.path());
        let cfg = Config::default();
        let invocation = build(&app, &cfg, &app.default_pidfile(), &BTreeMap::new()).unwrap();
        assert!(invocation.program.ends_with("foreground-runner"));
        assert!(invocation.args.contains(&"--".to_string()));
    }

    #[test]
    fn build_with_rotation_prepends_log_tee() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_run_script(dir.path());
        let mut cfg = Config::default();
        cfg.logging.file = "app.log".into();
        cfg.logging.max_size = "10M".into();
        let invocation = build(&app, &cfg, &app.default_pidfile(), &BTreeMap::new()).unwrap();
        assert!(invocation.program.ends_with("log-tee"));
        assert!(invocation.args.iter().any(|a| a == "foreground-runner" || a.ends_with("foreground-runner")));
    }

    #[test]
    fn caller_env_overrides_config_env() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_run_script(dir.path());
        let mut cfg = Config::default();
        cfg.process.environment.insert("FOO".into(), "cfg".into());
        let mut caller = BTreeMap::new();
        caller.insert("FOO".into(), "caller".into());
        let invocation = build(&app, &cfg, &app.default_pidfile(), &caller).unwrap();
        assert_eq!(invocation.env.get("FOO"), Some(&"caller".to_string()));
    }
}
