//! Uniform execution of shell operations against a [`Target`], local or
//! remote. Grounded on `bkt::command_runner::CommandRunner` for the
//! trait-over-process pattern and on `appdeploy_exec_*` in
//! `original_source/appdeploy.py` for the local/remote dual dispatch.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use crate::error::{AppDeployError, Result, TransportErrorKind};
use crate::output::Output;
use crate::target::Target;

/// Options for [`TargetExecutor::run`].
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Zero means unbounded.
    pub timeout: Duration,
    /// Raise a remote-command error on non-zero exit.
    pub check: bool,
    /// Whether this invocation performs a side effect; only mutating
    /// invocations are suppressed in dry-run mode.
    pub mutating: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            check: true,
            mutating: true,
        }
    }
}

impl ExecOptions {
    pub fn read_only() -> Self {
        Self {
            mutating: false,
            ..Default::default()
        }
    }

    pub fn no_check() -> Self {
        Self {
            check: false,
            ..Default::default()
        }
    }

    /// A read-only invocation whose non-zero exit is expected and handled by
    /// the caller (e.g. "not running"): `check: false` and `mutating: false`,
    /// so dry-run still executes it instead of faking the result.
    pub fn query() -> Self {
        Self {
            check: false,
            mutating: false,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }
}

/// Presents the same operation set regardless of target locality.
pub trait TargetExecutor: Send + Sync {
    fn run(&self, target: &Target, command: &str, opts: &ExecOptions) -> Result<RunResult>;
    fn copy(&self, target: &Target, local_path: &Path, remote_path: &str) -> Result<()>;
    fn read(&self, target: &Target, path: &str) -> Result<String>;
    fn exists(&self, target: &Target, path: &str) -> Result<bool>;
    fn mkdir(&self, target: &Target, path: &str) -> Result<()>;
    fn rm(&self, target: &Target, path: &str, recursive: bool) -> Result<()>;
    fn symlink(&self, target: &Target, link_path: &str, dest_path: &str) -> Result<()>;
    fn rename(&self, target: &Target, src: &str, dst: &str) -> Result<()>;

    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Real executor: `/bin/sh -c` locally, a single ssh invocation remotely.
pub struct RealExecutor {
    ssh_options: Vec<String>,
    first_ssh: AtomicBool,
}

impl RealExecutor {
    pub fn new(ssh_options: Vec<String>) -> Self {
        Self {
            ssh_options,
            first_ssh: AtomicBool::new(true),
        }
    }

    fn ssh_prefix(&self, host: &str, user: Option<&str>) -> Vec<String> {
        let mut cmd = vec!["ssh".to_string()];
        cmd.extend(self.ssh_options.iter().cloned());
        match user {
            Some(user) => cmd.push(format!("{user}@{host}")),
            None => cmd.push(host.to_string()),
        }
        cmd
    }

    fn run_impl(
        &self,
        target: &Target,
        command: &str,
        opts: &ExecOptions,
        remote_host: Option<&str>,
    ) -> Result<RunResult> {
        let argv: Vec<String> = match target {
            Target::Local { .. } => vec!["sh".to_string(), "-c".to_string(), command.to_string()],
            Target::Remote { host, user, .. } => {
                let mut prefix = self.ssh_prefix(host, user.as_deref());
                prefix.push(command.to_string());
                prefix
            }
        };

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let timeout_opt = if opts.timeout.is_zero() {
            None
        } else {
            Some(opts.timeout)
        };

        let (exit_code, stdout, stderr) =
            spawn_and_collect(&mut cmd, timeout_opt).map_err(|e| match e {
                SpawnError::Timeout => AppDeployError::Timeout {
                    command: command.to_string(),
                    secs: opts.timeout.as_secs(),
                },
                SpawnError::Io(e) => AppDeployError::Io(e),
            })?;

        if opts.check && exit_code != 0 {
            if target.is_remote() && exit_code == 255 {
                let kind = TransportErrorKind::classify(&stderr);
                return Err(AppDeployError::Transport {
                    kind,
                    host: remote_host.unwrap_or_default().to_string(),
                    detail: format!("{}\nhint: {}", stderr.trim(), kind.hint()),
                });
            }
            return Err(AppDeployError::RemoteCommand {
                command: command.to_string(),
                exit_code,
                stderr,
            });
        }

        Ok(RunResult {
            exit_code,
            stdout,
            stderr,
        })
    }

    fn maybe_connecting_status<T>(&self, target: &Target, f: impl FnOnce() -> T) -> T {
        if !target.is_remote() {
            return f();
        }
        if !self.first_ssh.swap(false, Ordering::SeqCst) {
            return f();
        }

        let done = Arc::new(AtomicBool::new(false));
        let done_clone = Arc::clone(&done);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(1));
            if !done_clone.load(Ordering::SeqCst) {
                Output::info("Connecting...");
            }
        });
        let result = f();
        done.store(true, Ordering::SeqCst);
        let _ = handle.join();
        result
    }
}

enum SpawnError {
    Timeout,
    Io(std::io::Error),
}

fn spawn_and_collect(
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> std::result::Result<(i32, String, String), SpawnError> {
    let mut child = cmd.spawn().map_err(SpawnError::Io)?;
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let stdout_handle = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(p) = stdout_pipe.as_mut() {
            let _ = p.read_to_string(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(p) = stderr_pipe.as_mut() {
            let _ = p.read_to_string(&mut buf);
        }
        buf
    });

    let status = match timeout {
        None => Some(child.wait().map_err(SpawnError::Io)?),
        Some(dur) => child.wait_timeout(dur).map_err(SpawnError::Io)?,
    };

    let Some(status) = status else {
        let _ = child.kill();
        let _ = child.wait();
        let _ = stdout_handle.join();
        let _ = stderr_handle.join();
        return Err(SpawnError::Timeout);
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    let exit_code = status.code().unwrap_or(-1);
    Ok((exit_code, stdout, stderr))
}

impl TargetExecutor for RealExecutor {
    fn run(&self, target: &Target, command: &str, opts: &ExecOptions) -> Result<RunResult> {
        if opts.mutating && self.is_dry_run() {
            unreachable!("RealExecutor is never dry-run; use DryRunExecutor to wrap it");
        }
        let host = match target {
            Target::Remote { host, .. } => Some(host.clone()),
            Target::Local { .. } => None,
        };
        self.maybe_connecting_status(target, || {
            self.run_impl(target, command, opts, host.as_deref())
        })
    }

    fn copy(&self, target: &Target, local_path: &Path, remote_path: &str) -> Result<()> {
        match target {
            Target::Local { .. } => {
                if let Some(parent) = Path::new(remote_path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(local_path, remote_path)?;
                Ok(())
            }
            Target::Remote { host, user, .. } => {
                let mut cmd = vec!["scp".to_string()];
                cmd.extend(self.ssh_options.iter().cloned());
                let dest = match user {
                    Some(user) => format!("{user}@{host}:{remote_path}"),
                    None => format!("{host}:{remote_path}"),
                };
                cmd.push(local_path.display().to_string());
                cmd.push(dest);

                let mut command = Command::new(&cmd[0]);
                command.args(&cmd[1..]);
                command.stdin(Stdio::null());
                command.stdout(Stdio::piped());
                command.stderr(Stdio::piped());
                let (exit_code, _stdout, stderr) = spawn_and_collect(&mut command, None)
                    .map_err(|e| match e {
                        SpawnError::Timeout => AppDeployError::Timeout {
                            command: "scp".to_string(),
                            secs: 0,
                        },
                        SpawnError::Io(e) => AppDeployError::Io(e),
                    })?;
                if exit_code != 0 {
                    if exit_code == 255 {
                        let kind = TransportErrorKind::classify(&stderr);
                        return Err(AppDeployError::Transport {
                            kind,
                            host: host.clone(),
                            detail: format!("{}\nhint: {}", stderr.trim(), kind.hint()),
                        });
                    }
                    return Err(AppDeployError::RemoteCommand {
                        command: "scp".to_string(),
                        exit_code,
                        stderr,
                    });
                }
                Ok(())
            }
        }
    }

    fn read(&self, target: &Target, path: &str) -> Result<String> {
        match target {
            Target::Local { .. } => Ok(std::fs::read_to_string(path)?),
            Target::Remote { .. } => {
                let result = self.run(
                    target,
                    &format!("cat {}", shlex::quote(path)),
                    &ExecOptions::read_only(),
                )?;
                Ok(result.stdout)
            }
        }
    }

    fn exists(&self, target: &Target, path: &str) -> Result<bool> {
        match target {
            Target::Local { .. } => Ok(Path::new(path).exists()),
            Target::Remote { .. } => {
                let result = self.run(
                    target,
                    &format!("test -e {}", shlex::quote(path)),
                    &ExecOptions::no_check(),
                )?;
                Ok(result.ok())
            }
        }
    }

    fn mkdir(&self, target: &Target, path: &str) -> Result<()> {
        match target {
            Target::Local { .. } => {
                std::fs::create_dir_all(path)?;
                Ok(())
            }
            Target::Remote { .. } => {
                self.run(
                    target,
                    &format!("mkdir -p {}", shlex::quote(path)),
                    &ExecOptions::default(),
                )?;
                Ok(())
            }
        }
    }

    fn rm(&self, target: &Target, path: &str, recursive: bool) -> Result<()> {
        match target {
            Target::Local { .. } => {
                let p = Path::new(path);
                if !p.exists() {
                    return Ok(());
                }
                if recursive && p.is_dir() {
                    make_writable_recursive(p);
                    std::fs::remove_dir_all(p)?;
                } else {
                    std::fs::remove_file(p)?;
                }
                Ok(())
            }
            Target::Remote { .. } => {
                if !self.exists(target, path)? {
                    return Ok(());
                }
                if recursive {
                    let _ = self.run(
                        target,
                        &format!("chmod -R +w {}", shlex::quote(path)),
                        &ExecOptions::no_check(),
                    );
                }
                let flag = if recursive { "-rf" } else { "-f" };
                self.run(
                    target,
                    &format!("rm {flag} {}", shlex::quote(path)),
                    &ExecOptions::default(),
                )?;
                Ok(())
            }
        }
    }

    fn symlink(&self, target: &Target, link_path: &str, dest_path: &str) -> Result<()> {
        match target {
            Target::Local { .. } => {
                let link = Path::new(link_path);
                if link.exists() || link.symlink_metadata().is_ok() {
                    let _ = std::fs::remove_file(link);
                }
                #[cfg(unix)]
                std::os::unix::fs::symlink(dest_path, link)?;
                Ok(())
            }
            Target::Remote { .. } => {
                self.run(
                    target,
                    &format!(
                        "ln -sf {} {}",
                        shlex::quote(dest_path),
                        shlex::quote(link_path)
                    ),
                    &ExecOptions::default(),
                )?;
                Ok(())
            }
        }
    }

    fn rename(&self, target: &Target, src: &str, dst: &str) -> Result<()> {
        match target {
            Target::Local { .. } => {
                std::fs::rename(src, dst)?;
                Ok(())
            }
            Target::Remote { .. } => {
                self.run(
                    target,
                    &format!(
                        "mv {} {}",
                        shlex::quote(src),
                        shlex::quote(dst)
                    ),
                    &ExecOptions::default(),
                )?;
                Ok(())
            }
        }
    }
}

fn make_writable_recursive(root: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(entries) = walk_all(root) {
            for entry in entries {
                if let Ok(meta) = entry.metadata() {
                    let mut perms = meta.permissions();
                    perms.set_mode(perms.mode() | 0o200);
                    let _ = std::fs::set_permissions(&entry, perms);
                }
            }
        }
    }
}

#[cfg(unix)]
fn walk_all(root: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    let mut out = vec![root.to_path_buf()];
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                out.push(entry.path());
                if entry.path().is_dir() {
                    stack.push(entry.path());
                }
            }
        }
    }
    Ok(out)
}

/// Wraps any executor; mutating operations log `[dry-run] Would ...` and
/// succeed without side effects. Read-only operations (`exists`, `read`)
/// still execute for real, matching the spec's dry-run contract.
pub struct DryRunExecutor<E: TargetExecutor> {
    inner: E,
}

impl<E: TargetExecutor> DryRunExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<E: TargetExecutor> TargetExecutor for DryRunExecutor<E> {
    fn run(&self, target: &Target, command: &str, opts: &ExecOptions) -> Result<RunResult> {
        if opts.mutating {
            Output::dry_run(&format!("Would execute: {command}"));
            return Ok(RunResult {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        }
        self.inner.run(target, command, opts)
    }

    fn copy(&self, _target: &Target, local_path: &Path, remote_path: &str) -> Result<()> {
        Output::dry_run(&format!(
            "Would copy {} to {remote_path}",
            local_path.display()
        ));
        Ok(())
    }

    fn read(&self, target: &Target, path: &str) -> Result<String> {
        self.inner.read(target, path)
    }

    fn exists(&self, target: &Target, path: &str) -> Result<bool> {
        self.inner.exists(target, path)
    }

    fn mkdir(&self, _target: &Target, path: &str) -> Result<()> {
        Output::dry_run(&format!("Would create directory {path}"));
        Ok(())
    }

    fn rm(&self, _target: &Target, path: &str, _recursive: bool) -> Result<()> {
        Output::dry_run(&format!("Would remove {path}"));
        Ok(())
    }

    fn symlink(&self, _target: &Target, link_path: &str, dest_path: &str) -> Result<()> {
        Output::dry_run(&format!("Would create symlink {link_path} -> {dest_path}"));
        Ok(())
    }

    fn rename(&self, _target: &Target, src: &str, dst: &str) -> Result<()> {
        Output::dry_run(&format!("Would rename {src} to {dst}"));
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

pub fn elapsed_since(start: Instant) -> Duration {
    start.elapsed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn local_exists_and_mkdir_and_rm() {
        let dir = tempfile::tempdir().unwrap();
        let exec = RealExecutor::new(vec![]);
        let target = Target::Local {
            path: dir.path().to_path_buf(),
        };
        let sub = dir.path().join("a/b");
        exec.mkdir(&target, sub.to_str().unwrap()).unwrap();
        assert!(exec.exists(&target, sub.to_str().unwrap()).unwrap());
        exec.rm(&target, dir.path().join("a").to_str().unwrap(), true)
            .unwrap();
        assert!(!exec.exists(&target, sub.to_str().unwrap()).unwrap());
    }

    #[test]
    fn local_symlink_and_rename() {
        let dir = tempfile::tempdir().unwrap();
        let exec = RealExecutor::new(vec![]);
        let target = Target::Local {
            path: dir.path().to_path_buf(),
        };
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "hi").unwrap();
        let link = dir.path().join("link");
        exec.symlink(&target, link.to_str().unwrap(), "file.txt")
            .unwrap();
        assert_eq!(exec.read(&target, link.to_str().unwrap()).unwrap(), "hi");

        let renamed = dir.path().join("renamed");
        exec.rename(&target, file.to_str().unwrap(), renamed.to_str().unwrap())
            .unwrap();
        assert!(exec.exists(&target, renamed.to_str().unwrap()).unwrap());
    }

    #[test]
    fn dry_run_skips_mutation_but_allows_reads() {
        let dir = tempfile::tempdir().unwrap();
        let exec = DryRunExecutor::new(RealExecutor::new(vec![]));
        let target = Target::Local {
            path: dir.path().to_path_buf(),
        };
        let path: PathBuf = dir.path().join("should-not-exist");
        exec.mkdir(&target, path.to_str().unwrap()).unwrap();
        assert!(!path.exists());
        assert!(!exec.exists(&target, path.to_str().unwrap()).unwrap());
    }
}
