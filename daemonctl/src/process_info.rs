//! Linux `/proc` introspection for `status --long`: memory, threads, cpu
//! time, and the process tree by walking `/proc/*/stat` parent pids.
//! Additive only — nothing else in this crate depends on it resolving.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    pub pid: i32,
    pub state: String,
    pub rss_kb: u64,
    pub threads: u32,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub start_time_ticks: u64,
}

pub fn is_alive(pid: i32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

/// Read `/proc/<pid>/stat` and `/proc/<pid>/status` for a best-effort
/// snapshot. Returns `None` if the process has already exited.
pub fn read(pid: i32) -> Option<ProcessInfo> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // comm may contain spaces/parens, so split on the last ')'.
    let after_comm = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // fields[0] is state (the field right after the comm).
    let state = fields.first().copied().unwrap_or("?").to_string();
    let utime_ticks = fields.get(11).and_then(|s| s.parse().ok()).unwrap_or(0);
    let stime_ticks = fields.get(12).and_then(|s| s.parse().ok()).unwrap_or(0);
    let start_time_ticks = fields.get(19).and_then(|s| s.parse().ok()).unwrap_or(0);

    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let mut rss_kb = 0;
    let mut threads = 0;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss_kb = rest.trim().trim_end_matches(" kB").trim().parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("Threads:") {
            threads = rest.trim().parse().unwrap_or(0);
        }
    }

    Some(ProcessInfo {
        pid,
        state,
        rss_kb,
        threads,
        utime_ticks,
        stime_ticks,
        start_time_ticks,
    })
}

/// Child pids of `pid`, found by walking every `/proc/*/stat` entry and
/// matching its parent-pid field (the field right after the comm field).
pub fn child_pids(pid: i32) -> Vec<i32> {
    let mut parents: HashMap<i32, i32> = HashMap::new();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    for entry in entries.flatten() {
        let Some(candidate) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        let Some(after_comm) = stat.rsplit_once(')').map(|(_, rest)| rest) else {
            continue;
        };
        let fields: Vec<&str> = after_comm.split_whitespace().collect();
        if let Some(ppid) = fields.get(1).and_then(|s| s.parse::<i32>().ok()) {
            parents.insert(candidate, ppid);
        }
    }
    parents
        .iter()
        .filter(|(_, &ppid)| ppid == pid)
        .map(|(&child, _)| child)
        .collect()
}

/// The full descendant tree rooted at `pid`, breadth-first.
pub fn process_tree(pid: i32) -> Vec<i32> {
    let mut tree = vec![pid];
    let mut frontier = vec![pid];
    while let Some(next) = frontier.pop() {
        for child in child_pids(next) {
            tree.push(child);
            frontier.push(child);
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_process_is_alive_and_readable() {
        let pid = std::process::id() as i32;
        assert!(is_alive(pid));
        if cfg!(target_os = "linux") {
            assert!(read(pid).is_some());
        }
    }

    #[test]
    fn nonexistent_pid_is_not_alive() {
        assert!(!is_alive(i32::MAX - 1));
    }
}
