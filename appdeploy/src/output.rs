//! User-facing console output, kept distinct from the `tracing` log stream.
//! Grounded on `bkt::output::Output` for the leveled-print/color/quiet
//! pattern, fused with `appdeploy_util_log_op` / `_set_log_target` /
//! `_delayed_status` from `original_source/appdeploy.py` for the
//! target-scoped operation log.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Local;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use is_terminal::IsTerminal;
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

/// Console presentation layer. Call [`Output::init`] once at startup.
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
        let cfg = Self::cfg();
        if cfg.quiet {
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

    pub fn dry_run(message: &str) {
        let cfg = Self::cfg();
        if cfg.quiet {
            return;
        }
        if cfg.color {
            println!("{} {message}", "[dry-run]".cyan().bold());
        } else {
            println!("[dry-run] {message}");
        }
    }

    /// Ask the user to confirm a destructive action. `yes` is the global
    /// `--yes` override; when stdin isn't a TTY and `yes` wasn't given there's
    /// nobody to ask, so the answer is no.
    pub fn confirm(message: &str, yes: bool) -> bool {
        if yes {
            return true;
        }
        if !std::io::stdin().is_terminal() {
            return false;
        }
        print!("{message} [y/N] ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut response = String::new();
        match std::io::stdin().read_line(&mut response) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(response.trim().to_lowercase().as_str(), "y" | "yes"),
        }
    }

    /// Start a status spinner that only becomes visible once `delay` has
    /// elapsed, so quick operations never flash a message on screen.
    pub fn delayed_status(message: impl Into<String>, delay: Duration) -> DelayedStatus {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::hidden());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("valid template"),
        );
        pb.set_message(message.into());

        let shown = Arc::new(AtomicBool::new(false));
        if !Self::cfg().quiet {
            let pb = pb.clone();
            let shown = Arc::clone(&shown);
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                if !shown.load(Ordering::SeqCst) {
                    pb.set_draw_target(ProgressDrawTarget::stderr());
                    pb.enable_steady_tick(Duration::from_millis(80));
                }
            });
        }
        DelayedStatus { pb, shown }
    }
}

/// A status spinner shown only once its operation outlives a short grace
/// period. Dropping it (or calling [`DelayedStatus::finish`]) hides it again.
pub struct DelayedStatus {
    pb: ProgressBar,
    shown: Arc<AtomicBool>,
}

impl DelayedStatus {
    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for DelayedStatus {
    fn drop(&mut self) {
        self.shown.store(true, Ordering::SeqCst);
        self.pb.finish_and_clear();
    }
}

/// Prefixes every line with `[TARGET] [HH:MM:SS]` and an optional
/// `[version=V]` suffix; used by the coordinator to narrate multi-step
/// operations against a specific target.
pub struct OpLog {
    target_display: String,
    file: Option<Mutex<std::fs::File>>,
}

impl OpLog {
    pub fn new(target_display: impl Into<String>) -> Self {
        Self {
            target_display: target_display.into(),
            file: None,
        }
    }

    pub fn with_file(target_display: impl Into<String>, path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            target_display: target_display.into(),
            file: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, message: &str, version: Option<&str>) {
        let line = self.format_line(message, version);
        Output::info(&line);
        self.append_to_file(&line);
    }

    pub fn log_verbose(&self, message: &str, version: Option<&str>) {
        let line = self.format_line(message, version);
        Output::verbose(&line);
        self.append_to_file(&line);
    }

    fn format_line(&self, message: &str, version: Option<&str>) -> String {
        let now = Local::now().format("%H:%M:%S");
        match version {
            Some(v) => format!("[{}] [{now}] {message} [version={v}]", self.target_display),
            None => format!("[{}] [{now}] {message}", self.target_display),
        }
    }

    fn append_to_file(&self, line: &str) {
        if let Some(file) = &self.file {
            use std::io::Write;
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_line_with_version() {
        let log = OpLog::new("example.com");
        let line = log.format_line("activated", Some("3"));
        assert!(line.starts_with("[example.com] ["));
        assert!(line.ends_with("activated [version=3]"));
    }

    #[test]
    fn formats_line_without_version() {
        let log = OpLog::new("local");
        let line = log.format_line("starting", None);
        assert!(line.ends_with("starting"));
        assert!(!line.contains("version="));
    }

    #[test]
    fn confirm_yes_flag_bypasses_prompt() {
        // yes=true must short-circuit before ever touching stdin.
        assert!(Output::confirm("Uninstall demo?", true));
    }
}
