//! Command-line surface. Flag names and defaults mirror what the deployer's
//! `daemon_client` module shells out with, so `appdeploy start/stop/...`
//! and a direct `daemonctl` invocation agree exactly.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "daemonctl", about = "Daemon lifecycle controller for one app directory", version)]
pub struct Cli {
    #[arg(short = 'v', long)]
    pub verbose: bool,

    #[arg(short = 'q', long)]
    pub quiet: bool,

    #[arg(long = "no-color")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the app in the foreground, with optional supervision
    Run { name: String },
    /// Start the app in the background
    Start {
        name: String,
        #[arg(short = 'w', long)]
        wait: bool,
        #[arg(long, default_value_t = 60)]
        timeout: u64,
        #[arg(long)]
        verbose: bool,
    },
    /// Stop the running app
    Stop {
        name: String,
        #[arg(short = 's', long, default_value = "TERM")]
        signal: String,
        #[arg(short = 't', long, default_value_t = 30)]
        timeout: u64,
        #[arg(long)]
        force: bool,
        #[arg(short = 'w', long)]
        wait: bool,
    },
    /// Stop then start the app
    Restart {
        name: String,
        #[arg(long = "stop-timeout", default_value_t = 30)]
        stop_timeout: u64,
        #[arg(long = "start-timeout", default_value_t = 60)]
        start_timeout: u64,
        #[arg(long)]
        force: bool,
        #[arg(short = 'w', long)]
        wait: bool,
        #[arg(long, default_value_t = 0)]
        delay: u64,
        #[arg(long)]
        verbose: bool,
    },
    /// Send a signal to the running app
    Kill {
        name: String,
        #[arg(default_value = "TERM")]
        signal: String,
        #[arg(long = "all")]
        all: bool,
        #[arg(short = 'w', long)]
        wait: bool,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Show pidfile + /proc status for one app, or every app
    Status {
        name: Option<String>,
        #[arg(short = 'l', long)]
        long: bool,
        #[arg(long)]
        json: bool,
    },
    /// Tail/head/follow the app's output files
    Logs {
        name: String,
        #[arg(short = 'f', long)]
        follow: bool,
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: u32,
        #[arg(long)]
        stdout: bool,
        #[arg(long)]
        stderr: bool,
        #[arg(long)]
        ops: bool,
        #[arg(long = "all")]
        all: bool,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        grep: Option<String>,
    },
}
