use thiserror::Error;

/// Error taxonomy for the daemon controller, mirroring the deployer's kinds
/// where they apply (input/state-precondition) and adding the supervisor's
/// own terminal condition.
#[derive(Debug, Error)]
pub enum DaemonCtlError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    StatePrecondition(String),

    #[error("{app}: supervisor exhausted restart attempts ({attempts})")]
    SupervisorExhausted { app: String, attempts: u32 },

    #[error("command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] appdeploy_common::CommonError),
}

pub type Result<T> = std::result::Result<T, DaemonCtlError>;
