//! Per-subcommand handlers, dispatched from `main.rs`. Grounded on the
//! flag grammar `appdeploy::daemon_client` shells out with, and on §4.H's
//! command descriptions.

use std::io::{Read, Seek};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;

use appdeploy_common::config::Config;

use crate::app::AppPaths;
use crate::cli::Command;
use crate::config as daemonctl_config;
use crate::error::{DaemonCtlError, Result};
use crate::health;
use crate::invocation;
use crate::output::Output;
use crate::pidfile;
use crate::process_info;
use crate::supervisor::{self, SupervisorOptions};

pub fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Run { name } => cmd_run(&name),
        Command::Start {
            name,
            wait,
            timeout,
            verbose,
        } => cmd_start(&name, wait, timeout, verbose),
        Command::Stop {
            name,
            signal,
            timeout,
            force,
            wait,
        } => cmd_stop(&name, &signal, timeout, force, wait),
        Command::Restart {
            name,
            stop_timeout,
            start_timeout,
            force,
            wait,
            delay,
            verbose,
        } => cmd_restart(&name, stop_timeout, start_timeout, force, wait, delay, verbose),
        Command::Kill {
            name,
            signal,
            all,
            wait,
            timeout,
        } => cmd_kill(&name, &signal, all, wait, timeout),
        Command::Status { name, long, json } => cmd_status(name.as_deref(), long, json),
        Command::Logs {
            name,
            follow,
            lines,
            stdout,
            stderr,
            ops,
            all,
            since,
            until,
            grep,
        } => cmd_logs(&name, follow, lines, stdout, stderr, ops, all, since, until, grep),
    }
}

fn load(name: &str) -> (AppPaths, Config) {
    let app = AppPaths::resolve(name);
    let cfg = daemonctl_config::load(&app).unwrap_or_default();
    (app, cfg)
}

fn supervisor_options(cfg: &Config) -> SupervisorOptions {
    SupervisorOptions {
        startup_delay: Duration::from_secs(cfg.monitoring.startup_delay),
        check_interval: Duration::from_secs(cfg.monitoring.check_interval),
        check_timeout: Duration::from_secs(cfg.monitoring.check_timeout),
        failure_threshold: cfg.monitoring.failure_threshold,
        success_threshold: cfg.monitoring.success_threshold,
        kill_timeout: Duration::from_secs(cfg.signals.kill_timeout),
        stop_signal: pidfile::parse_signal(&cfg.signals.stop_signal).unwrap_or(nix::sys::signal::Signal::SIGTERM),
        restart: cfg.process.restart,
        restart_delay: Duration::from_secs(cfg.process.restart_delay),
        restart_max_attempts: cfg.process.restart_max_attempts,
    }
}

/// Run the app in the foreground. Supervised only when restart policy or
/// health monitoring is enabled; otherwise the foreground runner is
/// invoked directly and its exit code propagates unchanged.
pub fn cmd_run(name: &str) -> Result<i32> {
    let (app, cfg) = load(name);
    let pidfile_path = resolved_pidfile(&app, &cfg);
    let invocation = invocation::build(&app, &cfg, &pidfile_path, &Default::default())?;
    let check = health::resolve(&app, &cfg);

    if cfg.monitoring.enabled || cfg.process.restart {
        let terminate = supervisor::install_terminate_flag();
        let code = supervisor::run(
            &invocation,
            check.as_ref(),
            &supervisor_options(&cfg),
            &pidfile_path,
            app.on_start_hook().as_deref(),
            app.on_stop_hook().as_deref(),
            &terminate,
        )?;
        Ok(code)
    } else {
        let mut child = invocation.to_command().spawn()?;
        pidfile::write(&pidfile_path, child.id() as i32)?;
        let status = child.wait()?;
        let _ = pidfile::remove(&pidfile_path);
        Ok(status.code().unwrap_or(1))
    }
}

fn resolved_pidfile(app: &AppPaths, cfg: &Config) -> PathBuf {
    if cfg.pidfile.enabled && !cfg.pidfile.path.is_empty() {
        PathBuf::from(&cfg.pidfile.path)
    } else {
        app.default_pidfile()
    }
}

/// Background-start: detach a child that re-invokes `daemonctl run <name>`
/// in its own session, so it survives this process exiting.
pub fn cmd_start(name: &str, wait: bool, timeout: u64, verbose: bool) -> Result<i32> {
    let (app, cfg) = load(name);
    let pidfile_path = resolved_pidfile(&app, &cfg);

    if let Some(pid) = pidfile::read(&pidfile_path) {
        if pidfile::is_alive(pid) {
            Output::info(&format!("{name} already running (pid {pid})"));
            return Ok(0);
        }
        let _ = pidfile::remove(&pidfile_path);
    }

    let exe = std::env::current_exe().map_err(DaemonCtlError::Io)?;
    let mut command = std::process::Command::new(&exe);
    command.arg("run").arg(name);
    if verbose {
        command.arg("--verbose");
    }
    command.env("DAEMONCTL_PATH", crate::app::base_path());
    command.stdin(std::process::Stdio::null());
    command.stdout(std::process::Stdio::null());
    command.stderr(std::process::Stdio::null());

    let setsid = cfg.daemon.setsid;
    unsafe {
        command.pre_exec(move || {
            if setsid {
                nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            }
            Ok(())
        });
    }

    command.spawn().map_err(DaemonCtlError::Io)?;

    if wait {
        let deadline = Instant::now() + Duration::from_secs(timeout);
        loop {
            if let Some(pid) = pidfile::read(&pidfile_path) {
                if pidfile::is_alive(pid) {
                    break;
                }
            }
            if Instant::now() >= deadline {
                return Err(DaemonCtlError::Timeout {
                    command: format!("start {name}"),
                    secs: timeout,
                });
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    Output::success(&format!("started {name}"));
    Ok(0)
}

pub fn cmd_stop(name: &str, signal: &str, timeout: u64, force: bool, wait: bool) -> Result<i32> {
    let (app, cfg) = load(name);
    let pidfile_path = resolved_pidfile(&app, &cfg);

    let Some(pid) = pidfile::read(&pidfile_path) else {
        Output::info(&format!("{name} is not running"));
        return Ok(0);
    };
    if !pidfile::is_alive(pid) {
        let _ = pidfile::remove(&pidfile_path);
        Output::info(&format!("{name} is not running"));
        return Ok(0);
    }

    let sig = pidfile::parse_signal(signal)?;
    pidfile::send_signal(pid, sig)?;

    if !wait {
        return Ok(0);
    }

    let deadline = Instant::now() + Duration::from_secs(timeout);
    loop {
        if !pidfile::is_alive(pid) {
            let _ = pidfile::remove(&pidfile_path);
            Output::success(&format!("stopped {name}"));
            return Ok(0);
        }
        if Instant::now() >= deadline {
            if force {
                let _ = pidfile::send_signal(pid, nix::sys::signal::Signal::SIGKILL);
                std::thread::sleep(Duration::from_millis(200));
                let _ = pidfile::remove(&pidfile_path);
                Output::warn(&format!("force-killed {name} after timeout"));
                return Ok(0);
            }
            return Err(DaemonCtlError::Timeout {
                command: format!("stop {name}"),
                secs: timeout,
            });
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_restart(
    name: &str,
    stop_timeout: u64,
    start_timeout: u64,
    force: bool,
    wait: bool,
    delay: u64,
    verbose: bool,
) -> Result<i32> {
    cmd_stop(name, "TERM", stop_timeout, force, true)?;
    if delay > 0 {
        std::thread::sleep(Duration::from_secs(delay));
    }
    cmd_start(name, wait, start_timeout, verbose)
}

pub fn cmd_kill(name: &str, signal: &str, all: bool, wait: bool, timeout: u64) -> Result<i32> {
    let (app, cfg) = load(name);
    let pidfile_path = resolved_pidfile(&app, &cfg);

    let Some(pid) = pidfile::read(&pidfile_path) else {
        return Err(DaemonCtlError::StatePrecondition(format!("{name} is not running")));
    };

    let sig = pidfile::parse_signal(signal)?;
    let targets = if all { process_info::process_tree(pid) } else { vec![pid] };
    for target in &targets {
        let _ = pidfile::send_signal(*target, sig);
    }

    if !wait {
        return Ok(0);
    }
    let deadline = Instant::now() + Duration::from_secs(timeout);
    while pidfile::is_alive(pid) {
        if Instant::now() >= deadline {
            return Err(DaemonCtlError::Timeout {
                command: format!("kill {name}"),
                secs: timeout,
            });
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(0)
}

pub fn cmd_status(name: Option<&str>, long: bool, json: bool) -> Result<i32> {
    let base = crate::app::base_path();
    let names: Vec<String> = match name {
        Some(n) => vec![n.to_string()],
        None => std::fs::read_dir(&base)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().join("run").is_dir())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default(),
    };

    #[derive(serde::Serialize)]
    struct StatusRow {
        name: String,
        running: bool,
        pid: Option<i32>,
        version: Option<String>,
        rss_kb: Option<u64>,
        threads: Option<u32>,
    }

    let mut rows = Vec::new();
    for app_name in &names {
        let app = AppPaths::new(&base, app_name);
        let cfg = daemonctl_config::load(&app).unwrap_or_default();
        let pidfile_path = resolved_pidfile(&app, &cfg);
        let pid = pidfile::read(&pidfile_path).filter(|p| pidfile::is_alive(*p));
        let info = pid.filter(|_| long).and_then(process_info::read);
        rows.push(StatusRow {
            name: app_name.clone(),
            running: pid.is_some(),
            pid,
            version: app.version(),
            rss_kb: info.as_ref().map(|i| i.rss_kb),
            threads: info.as_ref().map(|i| i.threads),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        return Ok(0);
    }

    let mut table = comfy_table::Table::new();
    table.set_header(vec!["NAME", "STATUS", "PID", "VERSION"]);
    for row in &rows {
        table.add_row(vec![
            row.name.clone(),
            if row.running { "running".to_string() } else { "stopped".to_string() },
            row.pid.map(|p| p.to_string()).unwrap_or_default(),
            row.version.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_logs(
    name: &str,
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
    let (app, cfg) = load(name);

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
    let ops_file = app.app_dir.join("ops.log");

    let mut files: Vec<&Path> = Vec::new();
    if ops {
        files.push(&ops_file);
    } else if stdout {
        files.push(&stdout_file);
    } else if stderr {
        files.push(&stderr_file);
    } else if all {
        files.push(&stdout_file);
        files.push(&stderr_file);
        files.push(&ops_file);
    } else {
        files.push(&stdout_file);
        files.push(&stderr_file);
    }

    let since_at = since.as_deref().and_then(parse_time);
    let until_at = until.as_deref().and_then(parse_time);

    for path in &files {
        print_tail(path, lines, since_at, until_at, grep.as_deref());
    }

    if follow {
        let mut positions: Vec<(PathBuf, u64)> = files
            .iter()
            .map(|p| (p.to_path_buf(), std::fs::metadata(p).map(|m| m.len()).unwrap_or(0)))
            .collect();
        loop {
            for (path, pos) in &mut positions {
                if let Ok(mut f) = std::fs::File::open(path) {
                    let len = f.metadata().map(|m| m.len()).unwrap_or(0);
                    if len > *pos {
                        let _ = f.seek(std::io::SeekFrom::Start(*pos));
                        let mut buf = String::new();
                        if f.read_to_string(&mut buf).is_ok() {
                            for line in buf.lines() {
                                if matches_filters(line, grep.as_deref()) {
                                    println!("{line}");
                                }
                            }
                        }
                        *pos = len;
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(500));
        }
    }

    Ok(0)
}

fn matches_filters(line: &str, grep: Option<&str>) -> bool {
    grep.map(|pattern| line.contains(pattern)).unwrap_or(true)
}

/// Parse a `--since`/`--until` argument: relative (`30s`, `5m`, `2h`, `1d`,
/// `1w`) or absolute (`YYYY-MM-DD[THH:MM:SS[Z]]`). Grounded on
/// `appdeploy_util_parse_time` in `original_source/appdeploy.py`.
fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let relative = Regex::new(r"^(\d+)([smhdw])$").ok()?;
    if let Some(caps) = relative.captures(text) {
        let value: i64 = caps[1].parse().ok()?;
        let seconds = match &caps[2] {
            "s" => value,
            "m" => value * 60,
            "h" => value * 3600,
            "d" => value * 86400,
            "w" => value * 604_800,
            _ => return None,
        };
        return Some(Utc::now() - chrono::Duration::seconds(seconds));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"] {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(text, fmt) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }
    None
}

/// Best-effort timestamp extraction: looks for an RFC3339-ish prefix such
/// as the one `OpLog` writes (`[HH:MM:SS]`). Lines without one are never
/// excluded by `--since`/`--until` — the app's own stdout/stderr format
/// is opaque to this controller.
fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let re = Regex::new(r"(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2})").ok()?;
    let caps = re.captures(line)?;
    let text = caps[1].replace(' ', "T");
    parse_time(&text)
}

fn in_time_range(line: &str, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> bool {
    if since.is_none() && until.is_none() {
        return true;
    }
    let Some(ts) = line_timestamp(line) else {
        return true;
    };
    if let Some(since) = since {
        if ts < since {
            return false;
        }
    }
    if let Some(until) = until {
        if ts > until {
            return false;
        }
    }
    true
}

fn print_tail(path: &Path, lines: u32, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>, grep: Option<&str>) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let filtered: Vec<&str> = content
        .lines()
        .filter(|l| matches_filters(l, grep) && in_time_range(l, since, until))
        .collect();
    let start = filtered.len().saturating_sub(lines as usize);
    for line in &filtered[start..] {
        println!("{line}");
    }
}
