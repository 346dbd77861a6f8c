pub mod activate;
pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod coordinator;
pub mod daemon_client;
pub mod error;
pub mod executor;
pub mod health;
pub mod layout;
pub mod output;
pub mod package;
pub mod target;

pub use error::{AppDeployError, Result};
