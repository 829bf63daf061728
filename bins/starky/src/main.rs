//! Starky - Starknet events to Datadog Logs.
//!
//! # Usage
//!
//! ```bash
//! # Record the contracts of a Dojo deployment
//! starky setup --abi-file manifest_mainnet.json
//!
//! # Stream from 500 blocks behind the head
//! STARKNET_RPC_URL=... DD_SITE=datadoghq.eu DD_API_KEY=... starky ingest --lookback-blocks 500
//!
//! # Try it without Datadog
//! starky ingest --from-block latest --dry-run --verbose
//! ```

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use config::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{default_level},hyper=warn,reqwest=warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    match cli.command {
        Command::Setup(args) => commands::setup::run(&cli.config, args),
        Command::Ingest(args) => commands::ingest::run(&cli.config, args, cli.verbose).await,
    }
}
