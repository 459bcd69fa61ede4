//! Switchyard CLI entry point.

// CLI output goes to stdout by design.
#![allow(clippy::print_stdout)]

use clap::Parser;
use switchyard::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("switchyard={default_level}"))),
        )
        .with_writer(std::io::stderr)
        .init();

    let output = cli::execute(&cli).await?;
    println!("{output}");
    Ok(())
}
