//! Leveled console output, grounded on `appdeploy::output::Output` /
//! `bkt::output::Output`. No target-scoped operation log here: daemonctl
//! always runs against the local host.

use std::sync::OnceLock;
use std::sync::RwLock;

use owo_colors::OwoColorize;

static CONFIG: OnceLock<RwLock<OutputConfig>> = OnceLock::new();

#[derive(Debug, Clone, Copy)]
struct OutputConfig {
    quiet: bool,
    verbose: bool,
    color: bool,
}

fn config() -> &'static RwLock<OutputConfig> {
    CONFIG.get_or_init(|| {
        RwLock::new(OutputConfig {
            quiet: false,
            verbose: false,
            color: true,
        })
    })
}

pub struct Output;

impl Output {
    pub fn init(quiet: bool, verbose: bool, color: bool) {
        let mut cfg = config().write().unwrap();
        cfg.quiet = quiet;
        cfg.verbose = verbose;
        cfg.color = color;
    }

    fn cfg() -> OutputConfig {
        *config().read().unwrap()
    }

    pub fn info(message: &str) {
        if Self::cfg().quiet {
            return;
        }
        println!("{message}");
    }

    pub fn success(message: &str) {
        let cfg = Self::cfg();
        if cfg.quiet {
            return;
        }
        if cfg.color {
            println!("{} {message}", "✓".green().bold());
        } else {
            println!("OK: {message}");
        }
    }

    pub fn warn(message: &str) {
        let cfg = Self::cfg();
        if cfg.color {
            eprintln!("{} {message}", "warning:".yellow().bold());
        } else {
            eprintln!("warning: {message}");
        }
    }

    pub fn error(message: &str) {
        let cfg = Self::cfg();
        if cfg.color {
            eprintln!("{} {message}", "error:".red().bold());
        } else {
            eprintln!("error: {message}");
        }
    }

    pub fn verbose(message: &str) {
        let cfg = Self::cfg();
        if !cfg.verbose || cfg.quiet {
            return;
        }
        if cfg.color {
            println!("{}", message.dimmed());
        } else {
            println!("{message}");
        }
    }
}
