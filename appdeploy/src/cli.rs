//! Command-line surface. Grounded on `appdeploy_build_parser` in
//! `original_source/appdeploy.py`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "appdeploy",
    about = "Package, deploy, and manage applications on local/remote targets",
    version
)]
pub struct Cli {
    /// Target specification
    #[arg(short = 't', long, default_value = ".")]
    pub target: String,

    #[arg(short = 'v', long)]
    pub verbose: bool,

    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Show what would be done
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Skip confirmation prompts
    #[arg(short = 'y', long)]
    pub yes: bool,

    #[arg(short = 'f', long)]
    pub force: bool,

    #[arg(short = 'T', long = "op-timeout", default_value_t = 30)]
    pub op_timeout: u64,

    #[arg(long)]
    pub local: bool,

    #[arg(long)]
    pub remote: bool,

    #[arg(long = "no-color")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate package structure
    Check {
        package: PathBuf,
        #[arg(long)]
        strict: bool,
    },
    /// Create archive from package directory
    Package {
        package_path: PathBuf,
        output: Option<PathBuf>,
        #[arg(short = 'n', long)]
        name: Option<String>,
        #[arg(short = 'r', long)]
        release: Option<String>,
        #[arg(short = 'c', long, default_value = "gz")]
        compression: String,
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        #[arg(long = "no-check")]
        no_check: bool,
    },
    /// Run package locally
    Run {
        package: PathBuf,
        #[arg(short = 'k', long)]
        keep: bool,
        #[arg(long, default_value_t = 0)]
        timeout: u64,
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        #[arg(short = 'C', long)]
        chdir: Option<PathBuf>,
        #[arg(long = "no-layers")]
        no_layers: bool,
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long)]
        conf: Option<PathBuf>,
    },
    /// Upload and unpack archive to target
    Install {
        package: PathBuf,
        #[arg(short = 'n', long)]
        name: Option<String>,
        #[arg(short = 'r', long)]
        release: Option<String>,
        #[arg(long)]
        activate: bool,
        #[arg(long, default_value_t = 3)]
        keep: u32,
    },
    /// Remove installed version
    Uninstall {
        package: String,
        version: Option<String>,
        #[arg(long = "all")]
        all: bool,
        #[arg(long = "keep-data")]
        keep_data: bool,
        #[arg(long = "keep-logs")]
        keep_logs: bool,
    },
    /// Set active version
    Activate {
        package: String,
        version: Option<String>,
        #[arg(long = "no-restart")]
        no_restart: bool,
    },
    /// Remove active symlinks
    Deactivate { package: String },
    /// List installed packages/versions
    List {
        package: Option<String>,
        #[arg(short = 'l', long)]
        long: bool,
        #[arg(long = "active-only")]
        active_only: bool,
        #[arg(long)]
        json: bool,
    },
    /// Atomic upgrade with rollback
    Upgrade {
        package: PathBuf,
        #[arg(short = 'n', long)]
        name: Option<String>,
        #[arg(short = 'r', long)]
        release: Option<String>,
        #[arg(long, default_value_t = 3)]
        keep: u32,
        #[arg(long = "no-rollback-on-fail")]
        no_rollback_on_fail: bool,
        #[arg(long = "health-timeout", default_value_t = 60)]
        health_timeout: u64,
        #[arg(long = "startup-grace", default_value_t = 5)]
        startup_grace: u64,
    },
    /// Rollback to previous version
    Rollback {
        package: String,
        #[arg(long = "to")]
        to_version: Option<String>,
        #[arg(long = "no-restart")]
        no_restart: bool,
    },
    /// Remove old inactive versions
    Clean {
        package: String,
        #[arg(long, default_value_t = 3)]
        keep: u32,
    },
    /// Install/update tools on target
    Bootstrap {
        #[arg(long)]
        check: bool,
        #[arg(long)]
        upgrade: bool,
        #[arg(long = "tools-path")]
        tools_path: Option<PathBuf>,
    },
    /// Start the active version
    Start {
        package: String,
        #[arg(short = 'a', long)]
        attach: bool,
        #[arg(short = 'w', long)]
        wait: bool,
        #[arg(long = "start-timeout", default_value_t = 60)]
        start_timeout: u64,
    },
    /// Stop running application
    Stop {
        package: String,
        #[arg(short = 's', long, default_value = "TERM")]
        signal: String,
        #[arg(short = 't', long, default_value_t = 30)]
        timeout: u64,
        #[arg(short = 'w', long)]
        wait: bool,
    },
    /// Restart running application
    Restart {
        package: String,
        #[arg(short = 'w', long)]
        wait: bool,
        #[arg(long = "stop-timeout", default_value_t = 30)]
        stop_timeout: u64,
        #[arg(long = "start-timeout", default_value_t = 60)]
        start_timeout: u64,
        #[arg(long, default_value_t = 0)]
        delay: u64,
    },
    /// Show application status
    Status {
        package: Option<String>,
        #[arg(short = 'l', long)]
        long: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show application logs
    Logs {
        package: String,
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
    /// Show package contents and configuration
    Show {
        package: String,
        version: Option<String>,
        #[arg(long)]
        config: bool,
    },
    /// Send signal to running application
    Kill {
        package: String,
        #[arg(default_value = "TERM")]
        signal: String,
        #[arg(short = 'a', long = "all-processes")]
        all_processes: bool,
        #[arg(short = 'w', long)]
        wait: bool,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
