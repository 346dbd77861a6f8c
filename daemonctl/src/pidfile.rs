//! Pidfile read/write/liveness. `run/.pid` is owned by the foreground
//! runner while the app is live; daemonctl only ever reads it, except
//! when cleaning up a stale one after a supervised child exits.

use std::path::Path;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::Result;

pub fn read(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

pub fn write(path: &Path, pid: i32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{pid}\n"))?;
    Ok(())
}

pub fn remove(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// `kill(pid, 0)` — true if a process with that pid exists and is
/// signalable by us, without actually sending a signal.
pub fn is_alive(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}

/// A pidfile is stale if it names a pid that no longer exists.
pub fn is_stale(path: &Path) -> bool {
    match read(path) {
        Some(pid) => !is_alive(pid),
        None => false,
    }
}

pub fn send_signal(pid: i32, sig: Signal) -> Result<()> {
    signal::kill(Pid::from_raw(pid), sig)
        .map_err(|e| crate::error::DaemonCtlError::Input(format!("kill({pid}, {sig}) failed: {e}")))
}

/// Parse a signal name (`TERM`, `SIGTERM`, `KILL`, ...) into a [`Signal`].
pub fn parse_signal(name: &str) -> Result<Signal> {
    let upper = name.trim().to_uppercase();
    let normalized = upper.strip_prefix("SIG").unwrap_or(&upper);
    match normalized {
        "TERM" => Ok(Signal::SIGTERM),
        "INT" => Ok(Signal::SIGINT),
        "HUP" => Ok(Signal::SIGHUP),
        "KILL" => Ok(Signal::SIGKILL),
        "QUIT" => Ok(Signal::SIGQUIT),
        "USR1" => Ok(Signal::SIGUSR1),
        "USR2" => Ok(Signal::SIGUSR2),
        "CONT" => Ok(Signal::SIGCONT),
        "STOP" => Ok(Signal::SIGSTOP),
        other => Err(crate::error::DaemonCtlError::Input(format!("unknown signal: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join(".pid");
        write(&path, 4242).unwrap();
        assert_eq!(read(&path), Some(4242));
    }

    #[test]
    fn self_pid_is_alive_stale_check_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".pid");
        write(&path, std::process::id() as i32).unwrap();
        assert!(!is_stale(&path));
    }

    #[test]
    fn bogus_pid_is_reported_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".pid");
        write(&path, i32::MAX - 1).unwrap();
        assert!(is_stale(&path));
    }

    #[test]
    fn missing_file_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_stale(&dir.path().join(".pid")));
    }

    #[test]
    fn parse_signal_accepts_with_and_without_sig_prefix() {
        assert_eq!(parse_signal("TERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("SIGKILL").unwrap(), Signal::SIGKILL);
        assert!(parse_signal("BOGUS").is_err());
    }
}
