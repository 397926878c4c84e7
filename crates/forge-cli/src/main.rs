//! Forge CLI - Resumable batch transformation of JSON-lines records.

use clap::Parser;
use forge_cli::commands;
use forge_cli::{Cli, Command, Formatter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> forge_cli::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let formatter = Formatter::new(cli.format, !cli.no_color);

    match cli.command {
        Command::Run(args) => commands::execute_run(args, &formatter).await,
        Command::Status(args) => commands::execute_status(args, &formatter).await,
        Command::Clear(args) => commands::execute_clear(args, &formatter).await,
        Command::InitConfig(args) => commands::execute_init_config(args, &formatter).await,
    }
}

/// Log to stderr so stdout carries only command output
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
