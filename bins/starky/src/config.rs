//! Command line configuration.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use starky::config::DEFAULT_CONFIG_FILE;
use starky::etl::extractor::poller::{DEFAULT_LOOKBACK_BLOCKS, DEFAULT_CHUNK_SIZE};
use starky::etl::extractor::StartBlock;

/// Starky: stream Starknet events to Datadog Logs
///
/// Event and function selectors are named from a Dojo manifest or a
/// compiled contract class before being shipped.
#[derive(Parser, Debug)]
#[command(name = "starky")]
#[command(about = "Stream Starknet events to Datadog Logs", long_about = None)]
pub struct Cli {
    /// Project config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Debug level logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse an ABI file and record its deployed contracts in the project config
    Setup(SetupArgs),
    /// Poll events and forward them to the log sink until interrupted
    Ingest(IngestArgs),
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Dojo manifest or `*.contract_class.json` file
    #[arg(long)]
    pub abi_file: PathBuf,

    /// Replace contracts already present in the config
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Starknet RPC URL
    #[arg(long, env = "STARKNET_RPC_URL")]
    pub rpc_url: String,

    /// Network name added to record tags
    #[arg(long, env = "STARKNET_NETWORK", default_value = "mainnet")]
    pub network: String,

    /// First block to read: a block number or `latest`
    ///
    /// When omitted, ingestion starts `--lookback-blocks` behind the head.
    #[arg(long)]
    pub from_block: Option<StartBlock>,

    /// Blocks behind the head to start from when no `--from-block` is given
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_BLOCKS)]
    pub lookback_blocks: u64,

    /// Idle time between cycles, in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub interval_ms: u64,

    /// Events per `starknet_getEvents` page
    #[arg(long, env = "STARKY_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Delay between transaction fetches, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub tx_fetch_delay_ms: u64,

    /// Skip transaction expansion into function-call records
    #[arg(long)]
    pub no_function_calls: bool,

    /// Do not call `starknet_traceTransaction`
    #[arg(long)]
    pub no_traces: bool,

    /// Log records locally instead of sending them to Datadog
    #[arg(long)]
    pub dry_run: bool,

    /// Datadog site (e.g. datadoghq.com)
    #[arg(long, env = "DD_SITE")]
    pub dd_site: Option<String>,

    /// Datadog API key
    #[arg(long, env = "DD_API_KEY", hide_env_values = true)]
    pub dd_api_key: Option<String>,

    /// Mask hashes and addresses in verbose previews
    #[arg(
        long,
        env = "STARKY_LOG_MASK",
        default_value = "1",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    pub log_mask: bool,

    /// Write every Datadog payload to this file
    #[arg(long)]
    pub dump_file: Option<PathBuf>,

    /// Seconds to wait for the loop on shutdown
    #[arg(long, default_value_t = 30)]
    pub shutdown_timeout: u64,
}

impl IngestArgs {
    pub fn start_block(&self) -> StartBlock {
        self.from_block
            .unwrap_or(StartBlock::Lookback(self.lookback_blocks))
    }
}
