use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use eco_ledger::LedgerError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod state;

use cli::{Cli, OutputFormat};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = cli.format;

    match commands::run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_error(&error, format);
            ExitCode::FAILURE
        }
    }
}

fn report_error(error: &anyhow::Error, format: OutputFormat) {
    match (format, error.downcast_ref::<LedgerError>()) {
        (OutputFormat::Json, Some(ledger)) => match serde_json::to_string_pretty(&ledger.to_body()) {
            Ok(body) => println!("{body}"),
            Err(_) => eprintln!("{} {ledger}", "error:".red().bold()),
        },
        (_, Some(ledger)) => eprintln!("{} {} ({})", "error:".red().bold(), ledger, ledger.kind()),
        (_, None) => eprintln!("{} {error:#}", "error:".red().bold()),
    }
}
