//! Resumable, paginated event polling.
//!
//! ```text
//! Bootstrapping ──▶ Polling-Page ──▶ Cycle-Idle ──▶ Polling-Page ...
//! ```
//!
//! A cycle reads every configured address from the cursor block to the
//! chain head observed at cycle start, following continuation tokens, and
//! dispatches each page as soon as it is processed. The cursor only moves once the whole cycle
//! succeeded. A failed cycle is retried from the same cursor after the
//! configured interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use starknet::core::types::{EmittedEvent, Felt};
use tokio_util::sync::CancellationToken;

use super::cursor::{BlockReference, IngestionCursor, StartBlock};
use super::{DataSource, EventsRequest};
use crate::etl::record::{ProcessedLogRecord, RecordContext};
use crate::etl::sink::LogSink;
use crate::etl::transactions::{FunctionCallExtractor, ProcessedTxSeen};
use crate::resolver::NameResolver;
use crate::selector::unknown_event_label;

pub const DEFAULT_CHUNK_SIZE: u64 = 300;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 100;
pub const DEFAULT_TX_FETCH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub start: StartBlock,
    /// Contracts to poll. Empty means one unfiltered pass.
    pub addresses: Vec<Felt>,
    pub chunk_size: u64,
    /// Idle time between cycles, also the backoff after a failed cycle.
    pub interval: Duration,
    pub tx_fetch_delay: Duration,
    pub exclude_event_names: HashSet<String>,
    /// Expand events into function-call records.
    pub expand_transactions: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            start: StartBlock::Lookback(DEFAULT_LOOKBACK_BLOCKS),
            addresses: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            interval: DEFAULT_INTERVAL,
            tx_fetch_delay: DEFAULT_TX_FETCH_DELAY,
            exclude_event_names: HashSet::new(),
            expand_transactions: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub pages: usize,
    pub events: usize,
    pub excluded: usize,
    pub function_calls: usize,
    pub dispatched: usize,
    /// Shutdown was requested between pages, the cursor did not move.
    pub interrupted: bool,
}

pub struct EventPoller {
    source: Arc<dyn DataSource>,
    sink: Arc<dyn LogSink>,
    resolver: Arc<NameResolver>,
    transactions: FunctionCallExtractor,
    context: RecordContext,
    config: PollerConfig,
    cursor: Option<IngestionCursor>,
}

impl EventPoller {
    pub fn new(
        source: Arc<dyn DataSource>,
        sink: Arc<dyn LogSink>,
        resolver: Arc<NameResolver>,
        context: RecordContext,
        config: PollerConfig,
    ) -> Self {
        let transactions = FunctionCallExtractor::new(
            source.clone(),
            resolver.clone(),
            context.clone(),
            config.tx_fetch_delay,
        );
        Self {
            source,
            sink,
            resolver,
            transactions,
            context,
            config,
            cursor: None,
        }
    }

    /// Current cursor, `None` until bootstrapped.
    pub fn cursor(&self) -> Option<&IngestionCursor> {
        self.cursor.as_ref()
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Resolves the start block into the first cursor. No-op once bootstrapped.
    pub async fn bootstrap(&mut self) -> Result<&IngestionCursor> {
        if self.cursor.is_none() {
            let start = self.config.start;
            let block = if start.needs_head() {
                let head = self
                    .source
                    .block_number()
                    .await
                    .context("Failed to fetch chain head for bootstrap")?;
                start.resolve(head)
            } else {
                start.resolve(0)
            };

            tracing::info!(
                target: "starky::etl::poller",
                start = ?start,
                from_block = block,
                "Cursor bootstrapped"
            );
            self.cursor = Some(IngestionCursor::at(block));
        }

        self.cursor
            .as_ref()
            .context("Cursor missing after bootstrap")
    }

    fn event_record(&self, event: &EmittedEvent) -> ProcessedLogRecord {
        let selector = event.keys.first().copied().unwrap_or(Felt::ZERO);
        let name = if self.resolver.is_known_for_contract(&selector, &event.from_address) {
            self.resolver
                .resolve_event_name_with_contract_context(&selector, &event.from_address)
        } else {
            tracing::debug!(
                target: "starky::etl::poller",
                selector = %format!("{selector:#x}"),
                contract = %format!("{:#x}", event.from_address),
                "Unknown event selector"
            );
            unknown_event_label(&selector)
        };

        ProcessedLogRecord::event(
            &self.context,
            event.from_address,
            selector,
            name,
            event.keys.clone(),
            event.data.clone(),
            event.block_number,
            event.transaction_hash,
        )
    }

    /// Names, filters and expands one page, then dispatches it.
    async fn process_page(
        &self,
        events: &[EmittedEvent],
        seen: &mut ProcessedTxSeen,
        stats: &mut CycleStats,
    ) -> Result<()> {
        let mut kept = Vec::with_capacity(events.len());
        let mut records = Vec::with_capacity(events.len());

        for event in events {
            let record = self.event_record(event);
            if self.config.exclude_event_names.contains(record.resolved_name()) {
                stats.excluded += 1;
                continue;
            }
            kept.push(event.clone());
            records.push(record);
        }

        if self.config.expand_transactions && !kept.is_empty() {
            let calls = self.transactions.extract(&kept, seen).await;
            stats.function_calls += calls.len();
            records.extend(calls);
        }

        if records.is_empty() {
            return Ok(());
        }

        let status = self
            .sink
            .send(&records)
            .await
            .with_context(|| format!("Sink {} rejected {} records", self.sink.name(), records.len()))?;
        stats.dispatched += records.len();

        tracing::info!(
            target: "starky::etl::poller",
            sink = self.sink.name(),
            records = records.len(),
            status,
            "Batch dispatched"
        );
        Ok(())
    }

    /// Runs one full cycle up to the head observed at its start.
    ///
    /// The cursor advances to that head only on success.
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) -> Result<CycleStats> {
        let cursor = self.bootstrap().await?.clone();
        let from = cursor.block();

        let addresses: Vec<Option<Felt>> = if self.config.addresses.is_empty() {
            vec![None]
        } else {
            self.config.addresses.iter().copied().map(Some).collect()
        };

        // Every page of the cycle is bounded by the same head, which becomes the next cursor.
        let head = self
            .source
            .block_number()
            .await
            .context("Failed to fetch chain head at cycle start")?;
        let head = match from {
            BlockReference::Number(block) => head.max(block),
            BlockReference::Head => head,
        };

        let mut stats = CycleStats::default();
        let mut seen = ProcessedTxSeen::new();
        let mut working = cursor;

        for address in addresses {
            loop {
                if shutdown.is_cancelled() {
                    stats.interrupted = true;
                    return Ok(stats);
                }

                let request = EventsRequest {
                    from,
                    to: BlockReference::Number(head),
                    address,
                    chunk_size: self.config.chunk_size,
                    continuation_token: working.continuation_token().map(str::to_string),
                };
                let page = self.source.get_events(request).await?;
                stats.pages += 1;
                stats.events += page.events.len();

                tracing::debug!(
                    target: "starky::etl::poller",
                    address = ?address.map(|a| format!("{a:#x}")),
                    cursor = %working,
                    events = page.events.len(),
                    has_more = page.continuation_token.is_some(),
                    "Fetched events page"
                );

                self.process_page(&page.events, &mut seen, &mut stats).await?;

                working.set_continuation(page.continuation_token);
                if working.continuation_token().is_none() {
                    break;
                }
            }
        }

        working.advance_to(head);

        tracing::info!(
            target: "starky::etl::poller",
            from = %from,
            next = %working,
            pages = stats.pages,
            events = stats.events,
            excluded = stats.excluded,
            function_calls = stats.function_calls,
            tx_fetched = seen.len(),
            "Cycle complete"
        );
        self.cursor = Some(working);
        Ok(stats)
    }

    /// Polls until `shutdown` is cancelled. Failed cycles are logged and retried.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        tracing::info!(
            target: "starky::etl::poller",
            addresses = self.config.addresses.len(),
            chunk_size = self.config.chunk_size,
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting event poller"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_cycle(&shutdown).await {
                Ok(stats) if stats.interrupted => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        target: "starky::etl::poller",
                        error = %format!("{e:#}"),
                        cursor = ?self.cursor.as_ref().map(ToString::to_string),
                        "Cycle failed, retrying from the same cursor"
                    );
                }
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.interval) => {}
            }
        }

        tracing::info!(target: "starky::etl::poller", "Event poller stopped");
    }
}
