//! Data source abstraction and the polling state machine built on it.

pub mod cursor;
pub mod jsonrpc;
pub mod poller;
pub mod retry;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use starknet::core::types::{EmittedEvent, Felt};

pub use cursor::{BlockReference, IngestionCursor, StartBlock};
pub use jsonrpc::JsonRpcDataSource;
pub use poller::{EventPoller, PollerConfig};
pub use retry::RetryPolicy;

/// One page request against `starknet_getEvents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsRequest {
    pub from: BlockReference,
    pub to: BlockReference,
    pub address: Option<Felt>,
    pub chunk_size: u64,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventsPage {
    pub events: Vec<EmittedEvent>,
    /// Absent on the last page.
    pub continuation_token: Option<String>,
}

/// Kind-specific transaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionPayload {
    Invoke { sender: Felt, calldata: Vec<Felt> },
    L1Handler { contract: Felt, calldata: Vec<Felt> },
    Declare { sender: Felt, class_hash: Felt },
    Deploy { class_hash: Felt, calldata: Vec<Felt> },
    DeployAccount { class_hash: Felt, calldata: Vec<Felt> },
}

/// Target of an invoke, read from its calldata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeTarget {
    pub selector: Felt,
    pub contract: Felt,
}

impl TransactionPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invoke { .. } => "invoke",
            Self::L1Handler { .. } => "l1_handler",
            Self::Declare { .. } => "declare",
            Self::Deploy { .. } => "deploy",
            Self::DeployAccount { .. } => "deploy_account",
        }
    }

    pub fn calldata(&self) -> &[Felt] {
        match self {
            Self::Invoke { calldata, .. }
            | Self::L1Handler { calldata, .. }
            | Self::Deploy { calldata, .. }
            | Self::DeployAccount { calldata, .. } => calldata,
            Self::Declare { .. } => &[],
        }
    }

    /// Selector at calldata position 0 and contract at position 1.
    ///
    /// Falls back to the sender when the calldata carries a single element.
    /// `None` for non-invoke payloads and empty calldata.
    pub fn invoke_target(&self) -> Option<InvokeTarget> {
        let Self::Invoke { sender, calldata } = self else {
            return None;
        };
        let selector = *calldata.first()?;
        Some(InvokeTarget {
            selector,
            contract: calldata.get(1).copied().unwrap_or(*sender),
        })
    }
}

/// A call made during execution, flattened from the trace tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCall {
    pub contract_address: Felt,
    pub selector: Felt,
    pub calldata: Vec<Felt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionView {
    pub hash: Felt,
    pub payload: TransactionPayload,
    pub internal_calls: Vec<InternalCall>,
}

/// Blockchain data source consumed by the poller.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetches one page of events.
    async fn get_events(&self, request: EventsRequest) -> Result<EventsPage>;

    /// Fetches a transaction, `None` when the node does not know it.
    async fn get_transaction(&self, hash: Felt) -> Result<Option<TransactionView>>;

    /// Current chain head.
    async fn block_number(&self) -> Result<u64>;

    /// ABI of the class deployed at `address`, as a JSON array.
    async fn get_contract_abi(&self, address: Felt) -> Result<Option<Value>>;
}
