use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use daemonctl::cli::Cli;
use daemonctl::commands;
use daemonctl::output::Output;

fn init_logging() {
    let filter = std::env::var("DAEMONCTL_LOG_LEVEL")
        .ok()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let color = !cli.no_color && std::env::var("DAEMONCTL_NO_COLOR").map(|v| v != "1").unwrap_or(true);
    Output::init(cli.quiet, cli.verbose, color);

    match commands::dispatch(cli.command) {
        Ok(code) => match u8::try_from(code) {
            Ok(code) => ExitCode::from(code),
            Err(_) => ExitCode::from(1),
        },
        Err(e) => {
            Output::error(&e.to_string());
            ExitCode::from(1)
        }
    }
}
