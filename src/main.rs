use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use boundmark::cli::{Cli, Commands};
use boundmark::commands::{query, run, verify};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let code = match &cli.command {
        Commands::Run(args) => run(&cli, args)?,
        Commands::Verify(args) => verify(&cli, args)?,
        Commands::Query(args) => query(&cli, args)?,
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
