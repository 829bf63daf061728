//! `starky ingest`: poll events and ship records until interrupted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use starky::abi::{AbiRegistry, OnchainAbiCache};
use starky::config::ProjectConfig;
use starky::etl::extractor::{DataSource, JsonRpcDataSource, PollerConfig};
use starky::etl::sink::{LogSink, TracingSink};
use starky::{build_resolver, StarkyConfig};
use starky_datadog_sink::{DatadogConfig, DatadogConfigError, DatadogSink};

use crate::config::IngestArgs;

pub async fn run(config_path: &Path, args: IngestArgs, verbose: bool) -> Result<()> {
    let project = ProjectConfig::load(config_path)?;
    let addresses = project.contract_addresses()?;
    if addresses.is_empty() {
        tracing::warn!(
            target: "starky::ingest",
            config = %config_path.display(),
            "No contracts configured, every event of the chain will be ingested"
        );
    }

    let source = JsonRpcDataSource::from_url(&args.rpc_url)?;
    let source = if args.no_traces {
        source.without_traces()
    } else {
        source
    };
    let source: Arc<dyn DataSource> = Arc::new(source);

    let registry = match &project.abi_file {
        Some(path) => {
            let registry = AbiRegistry::from_file(path)
                .with_context(|| format!("Failed to load ABI file {path}"))?;
            let summary = registry.summary();
            tracing::info!(
                target: "starky::ingest",
                abi_file = %path,
                format = %summary.format,
                events = summary.total_events,
                functions = summary.total_functions,
                "Loaded ABI"
            );
            Some(registry)
        }
        None => None,
    };

    let onchain = if registry.is_none() && !addresses.is_empty() {
        let mut cache = OnchainAbiCache::new();
        cache.fetch_all(source.as_ref(), &addresses).await;
        Some(cache)
    } else {
        None
    };

    let resolver = build_resolver(&project, registry.as_ref(), onchain.as_ref())?;

    let sink = build_sink(&args, verbose)?;

    let poller = PollerConfig {
        start: args.start_block(),
        addresses,
        chunk_size: args.chunk_size,
        interval: Duration::from_millis(args.interval_ms),
        tx_fetch_delay: Duration::from_millis(args.tx_fetch_delay_ms),
        exclude_event_names: project.exclude_event_names().iter().cloned().collect(),
        expand_transactions: !args.no_function_calls,
    };

    let config = StarkyConfig::builder()
        .with_source(source)
        .with_sink(sink)
        .with_resolver(Arc::new(resolver))
        .poller(poller)
        .network(args.network.clone())
        .shutdown_timeout(args.shutdown_timeout)
        .build()?;

    starky::run(config).await
}

fn build_sink(args: &IngestArgs, verbose: bool) -> Result<Arc<dyn LogSink>> {
    if args.dry_run {
        tracing::info!(target: "starky::ingest", "Dry run, records are logged locally");
        return Ok(Arc::new(TracingSink));
    }

    let site = args.dd_site.clone().ok_or(DatadogConfigError::MissingSite)?;
    let api_key = args.dd_api_key.clone().ok_or(DatadogConfigError::MissingApiKey)?;

    let mut config = DatadogConfig::new(site, api_key);
    config.verbose = verbose;
    config.mask = args.log_mask;
    config.dump_file = args.dump_file.clone();

    Ok(Arc::new(DatadogSink::new(config)?))
}
