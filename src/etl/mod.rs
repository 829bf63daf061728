pub mod extractor;
pub mod record;
pub mod sink;
pub mod transactions;

pub use extractor::{
    DataSource, EventPoller, EventsPage, EventsRequest, IngestionCursor, JsonRpcDataSource,
    PollerConfig, RetryPolicy, StartBlock, TransactionPayload, TransactionView,
};
pub use record::{ProcessedLogRecord, RecordContext, RecordKind};
pub use sink::{LogSink, TracingSink};
pub use transactions::{FunctionCallExtractor, ProcessedTxSeen};
