//! Starky - Starknet event ingestion into log pipelines.
//!
//! Events are pulled from a Starknet node, named through selector
//! dictionaries built from contract ABIs, expanded into function-call
//! records and shipped to a log sink.

pub mod abi;
pub mod config;
pub mod etl;
pub mod resolver;
pub mod selector;

pub use async_trait::async_trait;
pub use tokio;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use starknet::core::types::Felt;
use tokio_util::sync::CancellationToken;

use abi::{AbiRegistry, OnchainAbiCache};
use config::ProjectConfig;
use etl::extractor::{DataSource, EventPoller, PollerConfig};
use etl::record::RecordContext;
use etl::sink::LogSink;
use resolver::NameResolver;

/// Everything needed to run the ingestion loop.
pub struct StarkyConfig {
    pub source: Arc<dyn DataSource>,
    pub sink: Arc<dyn LogSink>,
    pub resolver: Arc<NameResolver>,
    pub poller: PollerConfig,
    pub context: RecordContext,

    /// Seconds to wait for the loop after a shutdown signal (default: 30).
    pub shutdown_timeout: u64,
}

impl StarkyConfig {
    pub fn builder() -> StarkyConfigBuilder {
        StarkyConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct StarkyConfigBuilder {
    source: Option<Arc<dyn DataSource>>,
    sink: Option<Arc<dyn LogSink>>,
    resolver: Option<Arc<NameResolver>>,
    poller: Option<PollerConfig>,
    network: Option<String>,
    shutdown_timeout: Option<u64>,
}

impl StarkyConfigBuilder {
    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<NameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn poller(mut self, config: PollerConfig) -> Self {
        self.poller = Some(config);
        self
    }

    /// Network tag added to every record (default: `mainnet`).
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn shutdown_timeout(mut self, seconds: u64) -> Self {
        self.shutdown_timeout = Some(seconds);
        self
    }

    pub fn build(self) -> Result<StarkyConfig> {
        Ok(StarkyConfig {
            source: self.source.context("A data source is required")?,
            sink: self.sink.context("A log sink is required")?,
            resolver: self.resolver.unwrap_or_default(),
            poller: self.poller.unwrap_or_default(),
            context: self
                .network
                .map_or_else(RecordContext::default, RecordContext::new),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(30),
        })
    }
}

/// Builds the selector dictionaries for a project.
///
/// With an ABI the registry drives the dictionaries, otherwise the
/// configured event names do. Legacy per-contract ABIs and on-chain
/// fetched ABIs are attached for context lookups.
pub fn build_resolver(
    project: &ProjectConfig,
    registry: Option<&AbiRegistry>,
    onchain: Option<&OnchainAbiCache>,
) -> Result<NameResolver> {
    let overrides = project.manual_event_mappings();
    let mut resolver = match registry {
        Some(registry) => NameResolver::from_registry(registry, overrides),
        None => NameResolver::from_event_names(project.event_names(), overrides),
    };

    for entry in project.contract_abis() {
        let address = Felt::from_hex(&entry.address)
            .map_err(|_| config::ConfigError::InvalidAddress(entry.address.clone()))?;
        let events = abi::extract_events(&abi::parse_abi_items(&entry.abi));
        resolver = resolver.with_contract_events(address, &events);
    }

    if let Some(onchain) = onchain {
        for (address, events) in onchain.iter() {
            resolver = resolver.with_contract_events(*address, events);
        }
    }

    Ok(resolver)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "starky::main", error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(target: "starky::main", error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!(target: "starky::main", "Received SIGINT (Ctrl+C), initiating graceful shutdown...");
        }
        () = terminate => {
            tracing::info!(target: "starky::main", "Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Runs the ingestion loop until SIGINT or SIGTERM.
///
/// NOTE: The caller is responsible for initializing the tracing subscriber.
pub async fn run(config: StarkyConfig) -> Result<()> {
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    run_until(config, shutdown).await
}

/// Runs the ingestion loop until `shutdown` is cancelled.
pub async fn run_until(config: StarkyConfig, shutdown: CancellationToken) -> Result<()> {
    tracing::info!(
        target: "starky::main",
        sink = config.sink.name(),
        known_events = config.resolver.events().len(),
        known_functions = config.resolver.functions().len(),
        "Starting Starky"
    );

    let mut poller = EventPoller::new(
        config.source,
        config.sink,
        config.resolver,
        config.context,
        config.poller,
    );

    let loop_token = shutdown.clone();
    let handle = tokio::spawn(async move {
        poller.run(loop_token).await;
    });

    shutdown.cancelled().await;
    tracing::info!(target: "starky::main", "Waiting for the ingestion loop to stop...");

    let timeout = Duration::from_secs(config.shutdown_timeout);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => {
            tracing::info!(target: "starky::main", "Ingestion loop stopped");
        }
        Ok(Err(e)) => {
            tracing::error!(target: "starky::main", error = %e, "Ingestion loop panicked");
        }
        Err(_) => {
            tracing::warn!(
                target: "starky::main",
                timeout_secs = config.shutdown_timeout,
                "Ingestion loop did not stop in time, forcing shutdown"
            );
        }
    }

    tracing::info!(target: "starky::main", "Starky shutdown complete");
    Ok(())
}
