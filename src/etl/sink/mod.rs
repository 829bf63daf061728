//! Log sinks: where processed records end up.

use async_trait::async_trait;

use crate::etl::record::ProcessedLogRecord;

/// Destination for processed records.
///
/// `send` is called once per non-empty batch. An error fails the current
/// cycle, which is then retried from the same cursor.
#[async_trait]
pub trait LogSink: Send + Sync {
    fn name(&self) -> &str;

    /// Delivers a batch and returns an HTTP-like status code.
    async fn send(&self, records: &[ProcessedLogRecord]) -> anyhow::Result<u16>;
}

/// Writes records to the tracing subscriber. Used for dry runs.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl LogSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn send(&self, records: &[ProcessedLogRecord]) -> anyhow::Result<u16> {
        for record in records {
            tracing::info!(
                target: "starky::sink::tracing",
                kind = record.kind.as_str(),
                name = record.resolved_name(),
                contract = %format!("{:#x}", record.contract_address),
                selector = %format!("{:#x}", record.selector),
                block = ?record.block_number,
                tx_hash = %format!("{:#x}", record.transaction_hash),
                "record"
            );
        }
        Ok(200)
    }
}
