use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use appdeploy::cli::Cli;
use appdeploy::commands::{self, Context};
use appdeploy::output::Output;

fn ssh_options() -> Vec<String> {
    std::env::var("APPDEPLOY_SSH_OPTIONS")
        .ok()
        .and_then(|v| shlex::split(&v))
        .unwrap_or_default()
}

fn init_logging() {
    let filter = std::env::var("APPDEPLOY_LOG")
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

    let color = !cli.no_color && std::env::var("APPDEPLOY_NO_COLOR").is_err();
    Output::init(cli.quiet, cli.verbose, color);

    let ctx = match Context::new(&cli.target, cli.local, cli.remote, cli.dry_run, ssh_options(), cli.force, cli.yes) {
        Ok(ctx) => ctx,
        Err(e) => {
            Output::error(&e.to_string());
            return ExitCode::from(1);
        }
    };

    match commands::dispatch(&ctx, cli.command) {
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
