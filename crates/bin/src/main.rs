mod cli;
mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use output::OutputFormat;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries command output, logs go to stderr
    let filter = EnvFilter::try_from_env("VOUCH_LOG").unwrap_or_else(|_| EnvFilter::new("vouch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match &cli.command {
        Commands::Keygen(args) => commands::keygen::run(args, format),
        Commands::Inspect(args) => commands::inspect::run(args, format),
        Commands::Verify(args) => commands::verify::run(args, format),
        Commands::HashMessage(args) => commands::hash_message::run(args, format),
    }
}
