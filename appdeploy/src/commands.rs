//! Command handlers, one per subcommand. Grounded on the
//! `appdeploy_cmd_handler_*` family in `original_source/appdeploy.py`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use appdeploy_common::archive::ArchiveKind;
use comfy_table::Table;
use wait_timeout::ChildExt;

use crate::activate;
use crate::bootstrap::{self, ToolSources};
use crate::cli::{Cli, Command};
use crate::coordinator::{self, UninstallOptions, UpgradeOptions};
use crate::daemon_client::{self, LogOptions, LogStream, StartOptions, StopOptions};
use crate::error::{AppDeployError, Result};
use crate::executor::{DryRunExecutor, RealExecutor, TargetExecutor};
use crate::layout::{self, Layout};
use crate::output::{OpLog, Output};
use crate::package::{Package, Severity};
use crate::target::Target;

pub struct Context {
    pub executor: Arc<dyn TargetExecutor>,
    pub target: Target,
    pub force: bool,
    pub yes: bool,
}

impl Context {
    pub fn new(target_str: &str, local: bool, remote: bool, dry_run: bool, ssh_options: Vec<String>, force: bool, yes: bool) -> Result<Self> {
        let target = Target::parse(target_str, &PathBuf::from("/srv/apps"), local, remote)?;
        let real = RealExecutor::new(ssh_options);
        let executor: Arc<dyn TargetExecutor> = if dry_run {
            Arc::new(DryRunExecutor::new(real))
        } else {
            Arc::new(real)
        };
        Ok(Self { executor, target, force, yes })
    }

    fn layout<'a>(&'a self, name: impl Into<String>) -> Layout<'a> {
        Layout::new(Arc::clone(&self.executor), &self.target, name)
    }

    fn oplog(&self) -> OpLog {
        OpLog::new(self.target.display())
    }
}

fn split_name_version(package: &str) -> (String, Option<String>) {
    match package.split_once(':') {
        Some((name, version)) => (name.to_string(), Some(version.to_string())),
        None => (package.to_string(), None),
    }
}

pub fn dispatch(ctx: &Context, command: Command) -> Result<i32> {
    match command {
        Command::Check { package, strict } => cmd_check(&package, strict),
        Command::Package {
            package_path,
            output,
            name,
            release,
            compression,
            exclude,
            no_check,
        } => cmd_package(&package_path, output, name, release, &compression, exclude, no_check),
        Command::Run {
            package,
            timeout,
            env,
            chdir,
            no_layers,
            data,
            conf,
            ..
        } => cmd_run(ctx, &package, timeout, env, chdir, no_layers, data, conf),
        Command::Install {
            package,
            name,
            release,
            activate,
            keep,
        } => cmd_install(ctx, &package, name, release, activate, keep),
        Command::Uninstall {
            package,
            version,
            all,
            keep_data,
            keep_logs,
        } => cmd_uninstall(ctx, &package, version, all, keep_data, keep_logs),
        Command::Activate {
            package,
            version,
            no_restart,
        } => cmd_activate(ctx, &package, version, no_restart),
        Command::Deactivate { package } => cmd_deactivate(ctx, &package),
        Command::List {
            package,
            long,
            active_only,
            json,
        } => cmd_list(ctx, package, long, active_only, json),
        Command::Upgrade {
            package,
            name,
            release,
            keep,
            no_rollback_on_fail,
            health_timeout,
            startup_grace,
        } => cmd_upgrade(ctx, &package, name, release, keep, !no_rollback_on_fail, health_timeout, startup_grace),
        Command::Rollback {
            package,
            to_version,
            no_restart,
        } => cmd_rollback(ctx, &package, to_version, no_restart),
        Command::Clean { package, keep } => cmd_clean(ctx, &package, keep),
        Command::Bootstrap {
            check,
            upgrade,
            tools_path,
        } => cmd_bootstrap(ctx, check, upgrade, tools_path),
        Command::Start {
            package,
            attach,
            wait,
            start_timeout,
        } => cmd_start(ctx, &package, attach, wait, start_timeout),
        Command::Stop {
            package,
            signal,
            timeout,
            wait,
        } => cmd_stop(ctx, &package, &signal, timeout, wait),
        Command::Restart {
            package,
            wait,
            stop_timeout,
            start_timeout,
            delay,
        } => cmd_restart(ctx, &package, wait, stop_timeout, start_timeout, delay),
        Command::Status { package, long, json } => cmd_status(ctx, package, long, json),
        Command::Logs {
            package,
            follow,
            lines,
            stdout,
            stderr,
            ops,
            all,
            since,
            until,
            grep,
        } => cmd_logs(ctx, &package, follow, lines, stdout, stderr, ops, all, since, until, grep),
        Command::Show { package, version, config } => cmd_show(ctx, &package, version, config),
        Command::Kill {
            package,
            signal,
            all_processes,
            wait,
            timeout,
        } => cmd_kill(ctx, &package, &signal, all_processes, wait, timeout),
        Command::Completions { shell } => cmd_completions(shell),
    }
}

fn cmd_completions(shell: clap_complete::Shell) -> Result<i32> {
    let mut cmd = <Cli as clap::CommandFactory>::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(0)
}

fn cmd_check(package: &Path, strict: bool) -> Result<i32> {
    let pkg = Package::load(package, None, None)?;
    let findings = pkg.validate(strict)?;
    if findings.is_empty() {
        Output::success(&format!("{}:{} is valid", pkg.name, pkg.version));
        Ok(0)
    } else {
        let mut has_error = false;
        for (severity, message) in &findings {
            match severity {
                Severity::Error => {
                    has_error = true;
                    Output::error(message);
                }
                Severity::Warning => Output::warn(message),
            }
        }
        Ok(if has_error { 1 } else { 0 })
    }
}

fn cmd_package(
    package_path: &Path,
    output: Option<PathBuf>,
    name: Option<String>,
    release: Option<String>,
    compression: &str,
    exclude: Vec<String>,
    no_check: bool,
) -> Result<i32> {
    let pkg = Package::load(package_path, name.as_deref(), release.as_deref())?;
    if !no_check {
        let findings = pkg.validate(false)?;
        let mut has_error = false;
        for (severity, message) in &findings {
            match severity {
                Severity::Error => {
                    has_error = true;
                    Output::error(message);
                }
                Severity::Warning => Output::warn(message),
            }
        }
        if has_error {
            return Ok(1);
        }
    }
    let kind = match compression {
        "bz2" => ArchiveKind::Bz2,
        "xz" => ArchiveKind::Xz,
        _ => ArchiveKind::Gz,
    };
    let archive = pkg.create_archive(output, kind, &exclude, false)?;
    Output::success(&format!("Created {}", archive.display()));
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    _ctx: &Context,
    package: &Path,
    timeout: u64,
    env: Vec<String>,
    chdir: Option<PathBuf>,
    no_layers: bool,
    data: Option<PathBuf>,
    conf: Option<PathBuf>,
) -> Result<i32> {
    let pkg = Package::load(package, None, None)?;
    let _tmp_guard;
    let run_dir = if no_layers {
        if pkg.is_archive {
            let tmp = tempfile::Builder::new().prefix("appdeploy-run-").tempdir()?;
            appdeploy_common::archive::extract_archive(&pkg.path, tmp.path(), 0)
                .map_err(|e| AppDeployError::Input(e.to_string()))?;
            let resolved = single_subdir_or(tmp.path());
            _tmp_guard = Some(tmp);
            resolved
        } else {
            _tmp_guard = None;
            pkg.path.clone()
        }
    } else {
        let tmp = tempfile::Builder::new().prefix("appdeploy-run-").tempdir()?;
        let run_dir = build_simulated_layers(&pkg, tmp.path(), data.as_deref(), conf.as_deref())?;
        _tmp_guard = Some(tmp);
        run_dir
    };

    let run_script = ["run", "run.sh"]
        .iter()
        .map(|n| run_dir.join(n))
        .find(|p| p.exists())
        .ok_or_else(|| AppDeployError::Input("no run script found".to_string()))?;

    Output::info(&format!("Running {} from {}...", pkg.name, run_dir.display()));

    let mut command = std::process::Command::new(&run_script);
    command.current_dir(chdir.as_deref().unwrap_or(&run_dir));
    for kv in &env {
        if let Some((k, v)) = kv.split_once('=') {
            command.env(k, v);
        }
    }

    let mut child = command.spawn()?;
    let status = if timeout > 0 {
        match child.wait_timeout(Duration::from_secs(timeout))? {
            Some(status) => status,
            None => {
                child.kill()?;
                child.wait()?;
                Output::error(&format!("Timeout after {timeout}s"));
                return Ok(1);
            }
        }
    } else {
        child.wait()?
    };

    Ok(status.code().unwrap_or(1))
}

fn single_subdir_or(base: &Path) -> PathBuf {
    let entries: Vec<_> = std::fs::read_dir(base)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .collect();
    if entries.len() == 1 && entries[0].path().is_dir() {
        entries[0].path()
    } else {
        base.to_path_buf()
    }
}

fn copy_layer_contents(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

fn symlink_layer(run_dir: &Path, layer_rel: &str, source_dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(source_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let link = run_dir.join(&name);
        if link.exists() || link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link).ok();
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(format!("{layer_rel}/{}", name.to_string_lossy()), &link)?;
    }
    Ok(())
}

fn build_simulated_layers(pkg: &Package, tmp: &Path, data: Option<&Path>, conf: Option<&Path>) -> Result<PathBuf> {
    let dist_dir = tmp.join("dist").join("current");
    let sim_data_dir = tmp.join("data");
    let sim_conf_dir = tmp.join("conf");
    let sim_run_dir = tmp.join("run");
    let sim_logs_dir = tmp.join("logs");

    std::fs::create_dir_all(&dist_dir)?;
    std::fs::create_dir_all(&sim_data_dir)?;
    std::fs::create_dir_all(&sim_conf_dir)?;
    std::fs::create_dir_all(&sim_run_dir)?;
    std::fs::create_dir_all(&sim_logs_dir)?;

    if pkg.is_archive {
        appdeploy_common::archive::extract_archive(&pkg.path, &dist_dir, 0)
            .map_err(|e| AppDeployError::Input(e.to_string()))?;
        let nested = single_subdir_or(&dist_dir);
        if nested != dist_dir {
            for entry in std::fs::read_dir(&nested)? {
                let entry = entry?;
                let target = dist_dir.join(entry.file_name());
                std::fs::rename(entry.path(), target)?;
            }
            std::fs::remove_dir(&nested)?;
        }
    } else {
        copy_layer_contents(&pkg.path, &dist_dir)?;
    }

    if let Some(data) = data {
        if data.exists() {
            copy_layer_contents(data, &sim_data_dir)?;
        }
    }
    if let Some(conf) = conf {
        if conf.exists() {
            copy_layer_contents(conf, &sim_conf_dir)?;
        }
    }

    symlink_layer(&sim_run_dir, "../dist/current", &dist_dir)?;
    symlink_layer(&sim_run_dir, "../data", &sim_data_dir)?;
    symlink_layer(&sim_run_dir, "../conf", &sim_conf_dir)?;

    #[cfg(unix)]
    std::os::unix::fs::symlink("../logs", sim_run_dir.join("logs"))?;

    Ok(sim_run_dir)
}

fn cmd_install(ctx: &Context, package: &Path, name: Option<String>, release: Option<String>, activate_after: bool, keep: u32) -> Result<i32> {
    let pkg = Package::load(package, name.as_deref(), release.as_deref())?;
    let layout = ctx.layout(pkg.name.clone());
    let oplog = ctx.oplog();
    coordinator::install(&ctx.executor, &ctx.target, &pkg, &layout, activate_after, keep, &oplog)?;
    Output::success(&format!("Installed {}:{}", pkg.name, pkg.version));
    Ok(0)
}

fn cmd_uninstall(ctx: &Context, package: &str, version: Option<String>, all: bool, keep_data: bool, keep_logs: bool) -> Result<i32> {
    let (name, inline_version) = split_name_version(package);
    let version = version.or(inline_version);
    let pkg_display = match &version {
        Some(v) => format!("{name}:{v}"),
        None => name.clone(),
    };
    if !Output::confirm(&format!("Uninstall {pkg_display}?"), ctx.yes) {
        return Ok(3);
    }
    let layout = ctx.layout(name);
    let opts = UninstallOptions {
        version,
        all_versions: all,
        keep_data,
        keep_logs,
    };
    coordinator::uninstall(&ctx.executor, &ctx.target, &layout, &opts)?;
    Output::success(&format!("Uninstalled {}", layout.name));
    Ok(0)
}

fn cmd_activate(ctx: &Context, package: &str, version: Option<String>, no_restart: bool) -> Result<i32> {
    let _ = no_restart;
    let (name, inline_version) = split_name_version(package);
    let layout = ctx.layout(name);
    let oplog = ctx.oplog();
    let outcome = activate::activate(&ctx.executor, &ctx.target, &layout, version.or(inline_version).as_deref(), &oplog)?;
    if outcome.was_running {
        daemon_client::restart(
            &ctx.executor,
            &ctx.target,
            &layout,
            false,
            true,
            30,
            60,
            0,
            false,
            &oplog,
        )?;
    }
    Ok(0)
}

fn cmd_deactivate(ctx: &Context, package: &str) -> Result<i32> {
    if !Output::confirm(&format!("Deactivate {package}?"), ctx.yes) {
        return Ok(3);
    }
    let layout = ctx.layout(package.to_string());
    let oplog = ctx.oplog();
    activate::deactivate(&ctx.executor, &ctx.target, &layout, &oplog)?;
    Ok(0)
}

fn cmd_list(ctx: &Context, package: Option<String>, long: bool, active_only: bool, json: bool) -> Result<i32> {
    let entries = layout::list_installed(Arc::clone(&ctx.executor), &ctx.target, package.as_deref(), long)?;
    let entries: Vec<_> = entries
        .into_iter()
        .filter(|e| !active_only || e.status == layout::VersionStatus::Active)
        .collect();

    if json {
        let json_entries: Vec<_> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "version": e.version,
                    "status": e.status.as_str(),
                    "installed": e.installed,
                    "size": e.size,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_entries)?);
        return Ok(0);
    }

    let mut table = Table::new();
    if long {
        table.set_header(vec!["NAME", "VERSION", "STATUS", "INSTALLED", "SIZE"]);
    } else {
        table.set_header(vec!["NAME", "VERSION", "STATUS"]);
    }
    for e in &entries {
        if long {
            table.add_row(vec![
                e.name.clone(),
                e.version.clone(),
                e.status.as_str().to_string(),
                e.installed.clone(),
                format_size(e.size),
            ]);
        } else {
            table.add_row(vec![e.name.clone(), e.version.clone(), e.status.as_str().to_string()]);
        }
    }
    println!("{table}");
    Ok(0)
}

fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{size}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_upgrade(
    ctx: &Context,
    package: &Path,
    name: Option<String>,
    release: Option<String>,
    keep: u32,
    rollback_on_fail: bool,
    health_timeout: u64,
    startup_grace: u64,
) -> Result<i32> {
    let pkg = Package::load(package, name.as_deref(), release.as_deref())?;
    if !Output::confirm(&format!("Upgrade from {}?", pkg.name), ctx.yes) {
        return Ok(3);
    }
    let layout = ctx.layout(pkg.name.clone());
    let oplog = ctx.oplog();
    let opts = UpgradeOptions {
        keep,
        rollback_on_fail,
        health_timeout: Duration::from_secs(health_timeout),
        startup_grace: Duration::from_secs(startup_grace),
    };
    let ok = coordinator::upgrade(&ctx.executor, &ctx.target, &pkg, &layout, &opts, &oplog)?;
    Ok(if ok { 0 } else { 1 })
}

fn cmd_rollback(ctx: &Context, package: &str, to_version: Option<String>, no_restart: bool) -> Result<i32> {
    if !Output::confirm(&format!("Rollback {package}?"), ctx.yes) {
        return Ok(3);
    }
    let layout = ctx.layout(package.to_string());
    let oplog = ctx.oplog();
    coordinator::rollback(&ctx.executor, &ctx.target, &layout, to_version.as_deref(), no_restart, &oplog)?;
    Ok(0)
}

fn cmd_clean(ctx: &Context, package: &str, keep: u32) -> Result<i32> {
    if !Output::confirm(&format!("Clean old versions of {package}?"), ctx.yes) {
        return Ok(3);
    }
    let layout = ctx.layout(package.to_string());
    let removed = layout.clean(keep)?;
    if removed.is_empty() {
        Output::info("Nothing to clean");
    } else {
        Output::success(&format!("Removed {} version(s): {}", removed.len(), removed.join(", ")));
    }
    Ok(0)
}

fn cmd_bootstrap(ctx: &Context, check: bool, upgrade: bool, tools_path: Option<PathBuf>) -> Result<i32> {
    let sources = ToolSources::resolve(tools_path.as_deref())?;
    let up_to_date = bootstrap::bootstrap(&ctx.executor, &ctx.target, &sources, ctx.force, check, upgrade)?;
    if up_to_date {
        Output::success("Tools up to date");
        Ok(0)
    } else {
        Output::warn("Tools out of date");
        Ok(1)
    }
}

fn cmd_start(ctx: &Context, package: &str, attach: bool, wait: bool, start_timeout: u64) -> Result<i32> {
    let (name, _) = split_name_version(package);
    let layout = ctx.layout(name);
    let oplog = ctx.oplog();
    let opts = StartOptions {
        wait,
        timeout: start_timeout,
        attach,
        verbose: false,
    };
    daemon_client::start(&ctx.executor, &ctx.target, &layout, &opts, &oplog)?;
    Ok(0)
}

fn cmd_stop(ctx: &Context, package: &str, signal: &str, timeout: u64, wait: bool) -> Result<i32> {
    let (name, _) = split_name_version(package);
    if !Output::confirm(&format!("Stop {name}?"), ctx.yes) {
        return Ok(3);
    }
    let layout = ctx.layout(name);
    let oplog = ctx.oplog();
    let opts = StopOptions {
        signal_name: signal.to_string(),
        force: ctx.force,
        timeout,
        wait,
    };
    daemon_client::stop(&ctx.executor, &ctx.target, &layout, &opts, &oplog)?;
    Ok(0)
}

fn cmd_restart(ctx: &Context, package: &str, wait: bool, stop_timeout: u64, start_timeout: u64, delay: u64) -> Result<i32> {
    let (name, _) = split_name_version(package);
    if !Output::confirm(&format!("Restart {name}?"), ctx.yes) {
        return Ok(3);
    }
    let layout = ctx.layout(name);
    let oplog = ctx.oplog();
    daemon_client::restart(&ctx.executor, &ctx.target, &layout, ctx.force, wait, stop_timeout, start_timeout, delay, false, &oplog)?;
    Ok(0)
}

fn cmd_status(ctx: &Context, package: Option<String>, long: bool, json: bool) -> Result<i32> {
    let (code, _) = daemon_client::status(&ctx.executor, &ctx.target, package.as_deref(), long, json)?;
    Ok(code)
}

#[allow(clippy::too_many_arguments)]
fn cmd_logs(
    ctx: &Context,
    package: &str,
    follow: bool,
    lines: u32,
    stdout: bool,
    stderr: bool,
    ops: bool,
    all: bool,
    since: Option<String>,
    until: Option<String>,
    grep: Option<String>,
) -> Result<i32> {
    let (name, _) = split_name_version(package);
    let layout = ctx.layout(name);
    let stream = if stdout {
        LogStream::Stdout
    } else if stderr {
        LogStream::Stderr
    } else if ops {
        LogStream::Ops
    } else {
        let _ = all;
        LogStream::All
    };
    let opts = LogOptions {
        follow,
        lines,
        stream,
        since,
        until,
        grep,
    };
    daemon_client::logs(&ctx.executor, &ctx.target, &layout, &opts)?;
    Ok(0)
}

fn cmd_show(ctx: &Context, package: &str, version: Option<String>, show_config: bool) -> Result<i32> {
    let (name, inline_version) = split_name_version(package);
    let layout = ctx.layout(name);
    let version = match version.or(inline_version) {
        Some(v) => v,
        None => layout
            .active_version()?
            .ok_or_else(|| AppDeployError::StatePrecondition(format!("{} has no active version", layout.name)))?,
    };
    let version_dir = layout.version_dir(&version);
    Output::info(&format!("{}:{version}", layout.name));
    if show_config {
        let conf_path = format!("{version_dir}/conf.toml");
        if ctx.executor.exists(&ctx.target, &conf_path)? {
            println!("{}", ctx.executor.read(&ctx.target, &conf_path)?);
        } else {
            Output::info("(no conf.toml)");
        }
    }
    Ok(0)
}

fn cmd_kill(ctx: &Context, package: &str, signal: &str, all_processes: bool, wait: bool, timeout: u64) -> Result<i32> {
    let (name, _) = split_name_version(package);
    let layout = ctx.layout(name);
    daemon_client::kill(&ctx.executor, &ctx.target, &layout, signal, all_processes, wait, timeout)?;
    Ok(0)
}
