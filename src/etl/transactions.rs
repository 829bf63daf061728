//! Expands event pages into function-call records.
//!
//! Each transaction is fetched at most once per cycle: the hash enters
//! [`ProcessedTxSeen`] before the fetch, so a failed fetch is not retried
//! within the same cycle either.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use starknet::core::types::{EmittedEvent, Felt};

use crate::etl::extractor::{DataSource, TransactionView};
use crate::etl::record::{ProcessedLogRecord, RecordContext};
use crate::resolver::NameResolver;
use crate::selector::unknown_function_label;

/// Transaction hashes already expanded during the current cycle.
#[derive(Debug, Default)]
pub struct ProcessedTxSeen {
    hashes: HashSet<Felt>,
}

impl ProcessedTxSeen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the hash was not seen before.
    pub fn insert(&mut self, hash: Felt) -> bool {
        self.hashes.insert(hash)
    }

    pub fn contains(&self, hash: &Felt) -> bool {
        self.hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Distinct transaction hashes of a page, in first-seen order, with the block of first sight.
fn distinct_transactions(events: &[EmittedEvent]) -> Vec<(Felt, Option<u64>)> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter(|e| seen.insert(e.transaction_hash))
        .map(|e| (e.transaction_hash, e.block_number))
        .collect()
}

pub struct FunctionCallExtractor {
    source: Arc<dyn DataSource>,
    resolver: Arc<NameResolver>,
    context: RecordContext,
    fetch_delay: Duration,
}

impl FunctionCallExtractor {
    pub fn new(
        source: Arc<dyn DataSource>,
        resolver: Arc<NameResolver>,
        context: RecordContext,
        fetch_delay: Duration,
    ) -> Self {
        Self {
            source,
            resolver,
            context,
            fetch_delay,
        }
    }

    fn function_name(&self, selector: &Felt) -> String {
        match self.resolver.resolve_function_name(selector) {
            Some(name) => name.to_string(),
            None => {
                tracing::debug!(
                    target: "starky::etl::transactions",
                    selector = %format!("{selector:#x}"),
                    "Unknown function selector"
                );
                unknown_function_label(selector)
            }
        }
    }

    /// Function-call records for one fetched transaction.
    pub fn records_for(&self, tx: &TransactionView, block_number: Option<u64>) -> Vec<ProcessedLogRecord> {
        let mut records = Vec::with_capacity(1 + tx.internal_calls.len());

        if let Some(target) = tx.payload.invoke_target() {
            records.push(ProcessedLogRecord::function_call(
                &self.context,
                target.contract,
                target.selector,
                self.function_name(&target.selector),
                tx.payload.calldata().to_vec(),
                block_number,
                tx.hash,
            ));
        }

        for call in &tx.internal_calls {
            records.push(ProcessedLogRecord::function_call(
                &self.context,
                call.contract_address,
                call.selector,
                self.function_name(&call.selector),
                call.calldata.clone(),
                block_number,
                tx.hash,
            ));
        }

        records
    }

    /// Fetches every transaction of the page not yet in `seen` and builds its records.
    ///
    /// Fetch failures and unknown transactions are logged and skipped.
    pub async fn extract(
        &self,
        events: &[EmittedEvent],
        seen: &mut ProcessedTxSeen,
    ) -> Vec<ProcessedLogRecord> {
        let pending: Vec<_> = distinct_transactions(events)
            .into_iter()
            .filter(|(hash, _)| !seen.contains(hash))
            .collect();

        let mut records = Vec::new();
        for (position, (hash, block_number)) in pending.into_iter().enumerate() {
            if position > 0 && !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
            seen.insert(hash);

            match self.source.get_transaction(hash).await {
                Ok(Some(tx)) => {
                    let tx_records = self.records_for(&tx, block_number);
                    tracing::debug!(
                        target: "starky::etl::transactions",
                        tx_hash = %format!("{hash:#x}"),
                        kind = tx.payload.kind(),
                        calls = tx_records.len(),
                        "Expanded transaction"
                    );
                    records.extend(tx_records);
                }
                Ok(None) => {
                    tracing::warn!(
                        target: "starky::etl::transactions",
                        tx_hash = %format!("{hash:#x}"),
                        "Transaction not found"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        target: "starky::etl::transactions",
                        tx_hash = %format!("{hash:#x}"),
                        error = %e,
                        "Failed to fetch transaction"
                    );
                }
            }
        }

        records
    }
}
