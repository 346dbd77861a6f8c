//! The supervisor loop: spawn the foreground-runner child, wait out a
//! startup grace period, then poll health (if configured) and restart on
//! repeated failure, bounded by `restart_max_attempts`. Grounded directly
//! on the pseudocode in §4.G — no prior-language source exists for this
//! component.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use crate::error::{DaemonCtlError, Result};
use crate::health::{self, HealthCheck};
use crate::invocation::Invocation;
use crate::output::Output;
use crate::pidfile;

pub struct SupervisorOptions {
    pub startup_delay: Duration,
    pub check_interval: Duration,
    pub check_timeout: Duration,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub kill_timeout: Duration,
    pub stop_signal: Signal,
    pub restart: bool,
    pub restart_delay: Duration,
    pub restart_max_attempts: u32,
}

/// Sleep in short increments, returning early (before the full duration
/// elapses) once `terminate` is set. Returns `true` if it slept the full
/// duration, `false` if interrupted.
fn sleep_interruptible(duration: Duration, terminate: &AtomicBool) -> bool {
    let step = Duration::from_millis(100);
    let deadline = Instant::now() + duration;
    loop {
        if terminate.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(step.min(remaining));
    }
}

fn run_hook(hook: Option<&std::path::Path>, name: &str) {
    let Some(path) = hook else { return };
    Output::verbose(&format!("running {name} hook"));
    match std::process::Command::new(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => Output::warn(&format!("{name} hook exited with {status}")),
        Err(e) => Output::warn(&format!("{name} hook failed to run: {e}")),
    }
}

fn terminate_child(child: &mut std::process::Child, signal: Signal, kill_timeout: Duration) {
    let pid = child.id() as i32;
    let _ = pidfile::send_signal(pid, signal);
    let deadline = Instant::now() + kill_timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(_) => return,
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Install a `ctrlc` handler that flips a shared flag on SIGINT/SIGTERM.
/// The supervisor never forwards the signal itself — the foreground
/// runner, which receives the same signal directly from the terminal/OS,
/// is responsible for forwarding it to the actual child process.
pub fn install_terminate_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    let _ = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    });
    flag
}

/// Run the supervisor loop until it returns the exit code to propagate
/// (or `SupervisorExhausted` once `restart_max_attempts` is spent).
pub fn run(
    invocation: &Invocation,
    health_check: Option<&HealthCheck>,
    opts: &SupervisorOptions,
    pidfile_path: &std::path::Path,
    on_start_hook: Option<&std::path::Path>,
    on_stop_hook: Option<&std::path::Path>,
    terminate: &Arc<AtomicBool>,
) -> Result<i32> {
    let mut restart_count = 0u32;

    loop {
        run_hook(on_start_hook, "on-start");

        let mut child = invocation.to_command().spawn()?;
        pidfile::write(pidfile_path, child.id() as i32)?;
        Output::verbose(&format!("spawned pid {}", child.id()));

        let mut child_exited = child.try_wait()?;
        if child_exited.is_none() {
            sleep_interruptible(opts.startup_delay, terminate);
            child_exited = child.try_wait()?;
        }

        let mut healthy = false;
        let mut fail_streak = 0u32;
        let mut ok_streak = 0u32;

        let exit_status = loop {
            if let Some(status) = child_exited {
                break Some(status);
            }

            if let Some(check) = health_check {
                let ok = health::run_once(check, opts.check_timeout, &invocation.working_dir);
                if ok {
                    fail_streak = 0;
                    ok_streak += 1;
                    if ok_streak >= opts.success_threshold && !healthy {
                        healthy = true;
                        Output::verbose("health check passing, marked healthy");
                    }
                } else {
                    ok_streak = 0;
                    fail_streak += 1;
                    if fail_streak >= opts.failure_threshold {
                        Output::warn("health check failing, terminating child");
                        terminate_child(&mut child, opts.stop_signal, opts.kill_timeout);
                        break child.try_wait()?;
                    }
                }
                sleep_interruptible(opts.check_interval, terminate);
            } else {
                sleep_interruptible(Duration::from_secs(1), terminate);
            }

            child_exited = child.try_wait()?;
        };

        run_hook(on_stop_hook, "on-stop");
        let _ = pidfile::remove(pidfile_path);

        let exit_code = exit_status
            .and_then(|s| s.code())
            .unwrap_or(1);

        if terminate.load(Ordering::SeqCst) {
            return Ok(0);
        }
        if !opts.restart {
            return Ok(exit_code);
        }

        restart_count += 1;
        if opts.restart_max_attempts > 0 && restart_count > opts.restart_max_attempts {
            return Err(DaemonCtlError::SupervisorExhausted {
                app: invocation.working_dir.display().to_string(),
                attempts: opts.restart_max_attempts,
            });
        }
        Output::warn(&format!("restarting (attempt {restart_count})"));
        sleep_interruptible(opts.restart_delay, terminate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn invocation(program: &str, args: &[&str]) -> Invocation {
        Invocation {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: BTreeMap::new(),
            working_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn no_restart_returns_child_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join(".pid");
        let inv = invocation("sh", &["-c", "exit 7"]);
        let opts = SupervisorOptions {
            startup_delay: Duration::from_millis(10),
            check_interval: Duration::from_millis(50),
            check_timeout: Duration::from_secs(1),
            failure_threshold: 3,
            success_threshold: 1,
            kill_timeout: Duration::from_secs(1),
            stop_signal: Signal::SIGTERM,
            restart: false,
            restart_delay: Duration::from_millis(10),
            restart_max_attempts: 0,
        };
        let terminate = Arc::new(AtomicBool::new(false));
        let code = run(&inv, None, &opts, &pidfile, None, None, &terminate).unwrap();
        assert_eq!(code, 7);
    }

    #[test]
    fn restart_exhaustion_yields_error() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join(".pid");
        let inv = invocation("sh", &["-c", "exit 1"]);
        let opts = SupervisorOptions {
            startup_delay: Duration::from_millis(5),
            check_interval: Duration::from_millis(20),
            check_timeout: Duration::from_secs(1),
            failure_threshold: 3,
            success_threshold: 1,
            kill_timeout: Duration::from_secs(1),
            stop_signal: Signal::SIGTERM,
            restart: true,
            restart_delay: Duration::from_millis(5),
            restart_max_attempts: 2,
        };
        let terminate = Arc::new(AtomicBool::new(false));
        let result = run(&inv, None, &opts, &pidfile, None, None, &terminate);
        assert!(matches!(result, Err(DaemonCtlError::SupervisorExhausted { .. })));
    }

    #[test]
    fn terminate_flag_short_circuits_restart() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join(".pid");
        let inv = invocation("sh", &["-c", "exit 0"]);
        let opts = SupervisorOptions {
            startup_delay: Duration::from_millis(5),
            check_interval: Duration::from_millis(20),
            check_timeout: Duration::from_secs(1),
            failure_threshold: 3,
            success_threshold: 1,
            kill_timeout: Duration::from_secs(1),
            stop_signal: Signal::SIGTERM,
            restart: true,
            restart_delay: Duration::from_millis(5),
            restart_max_attempts: 0,
        };
        let terminate = Arc::new(AtomicBool::new(true));
        let code = run(&inv, None, &opts, &pidfile, None, None, &terminate).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn sleep_interruptible_returns_false_when_flag_set() {
        let flag = AtomicBool::new(true);
        assert!(!sleep_interruptible(Duration::from_secs(5), &flag));
    }
}
