//! Shells out to `daemonctl` on the target to start/stop/restart/status/
//! logs/kill a running app. Grounded on `_daemonctl_cmd` and
//! `appdeploy_daemon_start/_stop/_restart/_status/_logs/_kill` in
//! `original_source/appdeploy.py`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppDeployError, Result};
use crate::executor::{ExecOptions, TargetExecutor};
use crate::layout::Layout;
use crate::output::{OpLog, Output};
use crate::target::Target;

fn daemonctl_cmd(target: &Target, name: &str) -> String {
    let _ = name;
    let bin_dir = format!("{}/bin", target.base_path().display());
    let app_base = target.base_path().display().to_string();
    format!("DAEMONCTL_PATH={} {bin_dir}/daemonctl", shlex::quote(&app_base))
}

fn current_version(executor: &Arc<dyn TargetExecutor>, target: &Target, layout: &Layout) -> Result<Option<String>> {
    let marker = format!("{}/.version", layout.run_dir());
    if executor.exists(target, &marker)? {
        Ok(Some(executor.read(target, &marker)?.trim().to_string()))
    } else {
        Ok(None)
    }
}

pub struct StartOptions {
    pub wait: bool,
    pub timeout: u64,
    pub verbose: bool,
    pub attach: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            wait: false,
            timeout: 60,
            verbose: false,
            attach: false,
        }
    }
}

pub fn start(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    opts: &StartOptions,
    oplog: &OpLog,
) -> Result<()> {
    let mut cmd = format!(
        "{} start {}",
        daemonctl_cmd(target, &layout.name),
        shlex::quote(&layout.name)
    );
    if opts.wait {
        cmd.push_str(" --wait");
    }
    if opts.timeout > 0 {
        cmd.push_str(&format!(" --timeout {}", opts.timeout));
    }
    if opts.verbose {
        cmd.push_str(" --verbose");
    }

    let version = current_version(executor, target, layout)?;
    oplog.log(&format!("Starting {}", layout.name), version.as_deref());

    let result = executor.run(
        target,
        &cmd,
        &ExecOptions::no_check().with_timeout(Duration::from_secs(opts.timeout + 10)),
    )?;
    if !result.ok() {
        Output::error(&format!("Failed to start {}", layout.name));
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
        return Err(AppDeployError::RemoteCommand {
            command: cmd,
            exit_code: result.exit_code,
            stderr: result.stderr,
        });
    }
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }

    if opts.attach {
        logs(executor, target, layout, &LogOptions { follow: true, ..Default::default() })?;
    }
    Ok(())
}

pub struct StopOptions {
    pub signal_name: String,
    pub force: bool,
    pub timeout: u64,
    pub wait: bool,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            signal_name: "TERM".to_string(),
            force: false,
            timeout: 30,
            wait: false,
        }
    }
}

pub fn stop(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    opts: &StopOptions,
    oplog: &OpLog,
) -> Result<()> {
    let mut cmd = format!(
        "{} stop {}",
        daemonctl_cmd(target, &layout.name),
        shlex::quote(&layout.name)
    );
    cmd.push_str(&format!(" --signal {}", opts.signal_name));
    cmd.push_str(&format!(" --timeout {}", opts.timeout));
    if opts.force {
        cmd.push_str(" --force");
    }
    if opts.wait {
        cmd.push_str(" --wait");
    }

    let version = current_version(executor, target, layout)?;
    oplog.log(&format!("Stopping {}", layout.name), version.as_deref());

    let result = executor.run(
        target,
        &cmd,
        &ExecOptions::no_check().with_timeout(Duration::from_secs(opts.timeout + 10)),
    )?;
    if !result.ok() {
        Output::error(&format!("Failed to stop {}", layout.name));
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
        return Err(AppDeployError::RemoteCommand {
            command: cmd,
            exit_code: result.exit_code,
            stderr: result.stderr,
        });
    }
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    Ok(())
}

pub fn restart(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    force: bool,
    wait: bool,
    stop_timeout: u64,
    start_timeout: u64,
    delay: u64,
    verbose: bool,
    oplog: &OpLog,
) -> Result<()> {
    let mut cmd = format!(
        "{} restart {}",
        daemonctl_cmd(target, &layout.name),
        shlex::quote(&layout.name)
    );
    cmd.push_str(&format!(" --stop-timeout {stop_timeout}"));
    cmd.push_str(&format!(" --start-timeout {start_timeout}"));
    if force {
        cmd.push_str(" --force");
    }
    if wait {
        cmd.push_str(" --wait");
    }
    if delay > 0 {
        cmd.push_str(&format!(" --delay {delay}"));
    }
    if verbose {
        cmd.push_str(" --verbose");
    }

    let version = current_version(executor, target, layout)?;
    oplog.log(&format!("Restarting {}", layout.name), version.as_deref());

    let total_timeout = stop_timeout + start_timeout + delay + 10;
    let result = executor.run(
        target,
        &cmd,
        &ExecOptions::no_check().with_timeout(Duration::from_secs(total_timeout)),
    )?;
    if !result.ok() {
        Output::error(&format!("Failed to restart {}", layout.name));
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
        return Err(AppDeployError::RemoteCommand {
            command: cmd,
            exit_code: result.exit_code,
            stderr: result.stderr,
        });
    }
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    Ok(())
}

pub fn status(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    name: Option<&str>,
    long_format: bool,
    json_format: bool,
) -> Result<(i32, String)> {
    let mut cmd = format!("{} status", daemonctl_cmd(target, name.unwrap_or_default()));
    if let Some(name) = name {
        cmd.push_str(&format!(" {}", shlex::quote(name)));
    }
    if long_format {
        cmd.push_str(" --long");
    }
    if json_format {
        cmd.push_str(" --json");
    }

    let result = executor.run(target, &cmd, &ExecOptions::query())?;
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    Ok((result.exit_code, result.stdout))
}

#[derive(Default)]
pub struct LogOptions {
    pub follow: bool,
    pub lines: u32,
    pub stream: LogStream,
    pub since: Option<String>,
    pub until: Option<String>,
    pub grep: Option<String>,
}

#[derive(Default, PartialEq, Eq)]
pub enum LogStream {
    #[default]
    All,
    Stdout,
    Stderr,
    Ops,
}

pub fn logs(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    opts: &LogOptions,
) -> Result<()> {
    let mut cmd = format!(
        "{} logs {}",
        daemonctl_cmd(target, &layout.name),
        shlex::quote(&layout.name)
    );
    cmd.push_str(&format!(" --lines {}", opts.lines));
    match opts.stream {
        LogStream::Stdout => cmd.push_str(" --stdout"),
        LogStream::Stderr => cmd.push_str(" --stderr"),
        LogStream::Ops => cmd.push_str(" --ops"),
        LogStream::All => cmd.push_str(" --all"),
    }
    if let Some(since) = &opts.since {
        cmd.push_str(&format!(" --since {}", shlex::quote(since)));
    }
    if let Some(until) = &opts.until {
        cmd.push_str(&format!(" --until {}", shlex::quote(until)));
    }
    if let Some(grep) = &opts.grep {
        cmd.push_str(&format!(" --grep {}", shlex::quote(grep)));
    }
    if opts.follow {
        cmd.push_str(" --follow");
        let result = executor.run(target, &cmd, &ExecOptions::query().with_timeout(Duration::ZERO));
        return result.map(|_| ());
    }

    let result = executor.run(target, &cmd, &ExecOptions::query().with_timeout(Duration::ZERO))?;
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    Ok(())
}

pub fn kill(
    executor: &Arc<dyn TargetExecutor>,
    target: &Target,
    layout: &Layout,
    signal_name: &str,
    all_processes: bool,
    wait: bool,
    timeout: u64,
) -> Result<()> {
    let mut cmd = format!(
        "{} kill {} {signal_name}",
        daemonctl_cmd(target, &layout.name),
        shlex::quote(&layout.name)
    );
    if all_processes {
        cmd.push_str(" --all");
    }
    let effective_timeout = if wait {
        cmd.push_str(" --wait");
        cmd.push_str(&format!(" --timeout {timeout}"));
        timeout + 10
    } else {
        30
    };

    let result = executor.run(
        target,
        &cmd,
        &ExecOptions::no_check().with_timeout(Duration::from_secs(effective_timeout)),
    )?;
    if !result.ok() {
        Output::error(&format!("Failed to send signal to {}", layout.name));
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
        return Err(AppDeployError::RemoteCommand {
            command: cmd,
            exit_code: result.exit_code,
            stderr: result.stderr,
        });
    }
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    Ok(())
}
