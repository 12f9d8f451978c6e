//! devloop CLI - local development loop server.
//!
//! Provides commands for:
//! - `serve`: Serve a directory, rebuild on change and reload connected browsers

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use commands::ServeArgs;
use error::CliError;
use output::Output;

/// devloop - local development loop server.
#[derive(Parser)]
#[command(name = "devloop", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory with live reload.
    Serve(ServeArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let verbose = matches!(&cli.command, Commands::Serve(args) if args.verbose);
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Serve(args) => tokio::runtime::Runtime::new()
            .map_err(CliError::from)
            .and_then(|rt| rt.block_on(args.execute())),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
