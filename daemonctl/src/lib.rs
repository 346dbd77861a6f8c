pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod health;
pub mod invocation;
pub mod output;
pub mod pidfile;
pub mod process_info;
pub mod supervisor;

pub use error::{DaemonCtlError, Result};
