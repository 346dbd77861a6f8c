use thiserror::Error;

/// The core error taxonomy. Kept as abstract kinds (not string matches) so
/// the coordinator and supervisor can branch on variant, matching the
/// propagation policy: the target executor classifies, component layers
/// propagate unchanged, only the coordinator and CLI boundary interpret.
#[derive(Debug, Error)]
pub enum AppDeployError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Validation(String),

    #[error("cannot connect to '{host}': {detail}")]
    Transport {
        kind: TransportErrorKind,
        host: String,
        detail: String,
    },

    #[error("remote command failed (exit {exit_code}): {command}{}", stderr_suffix(stderr))]
    RemoteCommand {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    #[error("{0}")]
    StatePrecondition(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] appdeploy_common::CommonError),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", stderr.trim())
    }
}

/// Sub-classification of a transport failure, derived from stderr fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Refused,
    Unreachable,
    UnresolvedHost,
    AuthDenied,
    TimedOut,
    Unknown,
}

impl TransportErrorKind {
    pub fn hint(self) -> &'static str {
        match self {
            TransportErrorKind::Refused => "Check that SSH is running on the remote host",
            TransportErrorKind::Unreachable => {
                "Check your network connection and that the host is reachable"
            }
            TransportErrorKind::UnresolvedHost => "Check that the hostname is correct",
            TransportErrorKind::AuthDenied => {
                "Check your SSH credentials or key configuration"
            }
            TransportErrorKind::TimedOut => "The host may be down or blocked by a firewall",
            TransportErrorKind::Unknown => "Check that the host is reachable and SSH is running",
        }
    }

    /// Classify by stderr substring fingerprint, grounded on
    /// `_format_ssh_connection_error`.
    pub fn classify(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if lower.contains("connection refused") {
            TransportErrorKind::Refused
        } else if lower.contains("no route to host") || lower.contains("network is unreachable") {
            TransportErrorKind::Unreachable
        } else if lower.contains("name or service not known") || lower.contains("could not resolve")
        {
            TransportErrorKind::UnresolvedHost
        } else if lower.contains("permission denied") {
            TransportErrorKind::AuthDenied
        } else if lower.contains("connection timed out") {
            TransportErrorKind::TimedOut
        } else {
            TransportErrorKind::Unknown
        }
    }
}

pub type Result<T> = std::result::Result<T, AppDeployError>;
