//! Starknet JSON-RPC data source.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use starknet::core::types::{
    BlockId, BlockTag, ContractClass, DeclareTransaction, DeployAccountTransaction, EventFilter,
    ExecuteInvocation, Felt, FunctionInvocation, InvokeTransaction, StarknetError, Transaction,
    TransactionTrace,
};
use starknet::providers::jsonrpc::{HttpTransport, JsonRpcClient};
use starknet::providers::{Provider, ProviderError};
use url::Url;

use super::{
    DataSource, EventsPage, EventsRequest, InternalCall, RetryPolicy, TransactionPayload,
    TransactionView,
};

pub struct JsonRpcDataSource {
    provider: Arc<JsonRpcClient<HttpTransport>>,
    retry_policy: RetryPolicy,
    fetch_traces: bool,
}

impl JsonRpcDataSource {
    pub fn new(provider: Arc<JsonRpcClient<HttpTransport>>) -> Self {
        Self {
            provider,
            retry_policy: RetryPolicy::default(),
            fetch_traces: true,
        }
    }

    pub fn from_url(rpc_url: &str) -> Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL {rpc_url}"))?;
        Ok(Self::new(Arc::new(JsonRpcClient::new(HttpTransport::new(url)))))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Disables `starknet_traceTransaction`, for nodes without the trace API.
    pub fn without_traces(mut self) -> Self {
        self.fetch_traces = false;
        self
    }

    pub fn provider(&self) -> &Arc<JsonRpcClient<HttpTransport>> {
        &self.provider
    }

    async fn internal_calls(&self, hash: Felt) -> Vec<InternalCall> {
        if !self.fetch_traces {
            return Vec::new();
        }
        match self.provider.trace_transaction(hash).await {
            Ok(trace) => flatten_trace(&trace),
            Err(e) => {
                tracing::debug!(
                    target: "starky::etl::jsonrpc",
                    tx_hash = %format!("{hash:#x}"),
                    error = %e,
                    "Trace unavailable, skipping internal calls"
                );
                Vec::new()
            }
        }
    }
}

fn payload_from_transaction(tx: Transaction) -> TransactionPayload {
    match tx {
        Transaction::Invoke(invoke) => match invoke {
            // V0 has no sender, the target contract stands in for it.
            InvokeTransaction::V0(t) => TransactionPayload::Invoke {
                sender: t.contract_address,
                calldata: t.calldata,
            },
            InvokeTransaction::V1(t) => TransactionPayload::Invoke {
                sender: t.sender_address,
                calldata: t.calldata,
            },
            InvokeTransaction::V3(t) => TransactionPayload::Invoke {
                sender: t.sender_address,
                calldata: t.calldata,
            },
        },
        Transaction::L1Handler(t) => TransactionPayload::L1Handler {
            contract: t.contract_address,
            calldata: t.calldata,
        },
        Transaction::Declare(declare) => {
            let (sender, class_hash) = match declare {
                DeclareTransaction::V0(t) => (t.sender_address, t.class_hash),
                DeclareTransaction::V1(t) => (t.sender_address, t.class_hash),
                DeclareTransaction::V2(t) => (t.sender_address, t.class_hash),
                DeclareTransaction::V3(t) => (t.sender_address, t.class_hash),
            };
            TransactionPayload::Declare { sender, class_hash }
        }
        Transaction::Deploy(t) => TransactionPayload::Deploy {
            class_hash: t.class_hash,
            calldata: t.constructor_calldata,
        },
        Transaction::DeployAccount(deploy) => {
            let (class_hash, calldata) = match deploy {
                DeployAccountTransaction::V1(t) => (t.class_hash, t.constructor_calldata),
                DeployAccountTransaction::V3(t) => (t.class_hash, t.constructor_calldata),
            };
            TransactionPayload::DeployAccount {
                class_hash,
                calldata,
            }
        }
    }
}

/// Calls below the account's `__execute__` entry, depth first.
fn flatten_trace(trace: &TransactionTrace) -> Vec<InternalCall> {
    let TransactionTrace::Invoke(invoke) = trace else {
        return Vec::new();
    };
    let ExecuteInvocation::Success(root) = &invoke.execute_invocation else {
        return Vec::new();
    };

    let mut calls = Vec::new();
    collect_calls(root, &mut calls);
    calls
}

fn collect_calls(invocation: &FunctionInvocation, out: &mut Vec<InternalCall>) {
    for call in &invocation.calls {
        out.push(InternalCall {
            contract_address: call.contract_address,
            selector: call.entry_point_selector,
            calldata: call.calldata.clone(),
        });
        collect_calls(call, out);
    }
}

fn abi_from_class(class: ContractClass) -> Result<Value> {
    match class {
        ContractClass::Sierra(sierra) => {
            serde_json::from_str(&sierra.abi).context("Sierra class ABI is not valid JSON")
        }
        ContractClass::Legacy(legacy) => {
            serde_json::to_value(legacy.abi.unwrap_or_default()).context("Failed to encode legacy ABI")
        }
    }
}

#[async_trait]
impl DataSource for JsonRpcDataSource {
    async fn get_events(&self, request: EventsRequest) -> Result<EventsPage> {
        let filter = EventFilter {
            from_block: Some(request.from.as_block_id()),
            to_block: Some(request.to.as_block_id()),
            address: request.address,
            keys: None,
        };
        let chunk_size = request.chunk_size;

        let page = self
            .retry_policy
            .execute("get_events", || {
                let provider = self.provider.clone();
                let filter = filter.clone();
                let token = request.continuation_token.clone();
                async move {
                    provider
                        .get_events(filter, token, chunk_size)
                        .await
                        .context("Failed to fetch events page")
                }
            })
            .await?;

        Ok(EventsPage {
            events: page.events,
            continuation_token: page.continuation_token,
        })
    }

    async fn get_transaction(&self, hash: Felt) -> Result<Option<TransactionView>> {
        let tx = self
            .retry_policy
            .execute("get_transaction", || {
                let provider = self.provider.clone();
                async move {
                    match provider.get_transaction_by_hash(hash).await {
                        Ok(tx) => Ok(Some(tx)),
                        Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {
                            Ok(None)
                        }
                        Err(e) => Err(anyhow::Error::new(e).context("Failed to fetch transaction")),
                    }
                }
            })
            .await?;

        let Some(tx) = tx else {
            return Ok(None);
        };

        let payload = payload_from_transaction(tx);
        let internal_calls = if matches!(payload, TransactionPayload::Invoke { .. }) {
            self.internal_calls(hash).await
        } else {
            Vec::new()
        };

        Ok(Some(TransactionView {
            hash,
            payload,
            internal_calls,
        }))
    }

    async fn block_number(&self) -> Result<u64> {
        self.retry_policy
            .execute("block_number", || {
                let provider = self.provider.clone();
                async move {
                    provider
                        .block_number()
                        .await
                        .context("Failed to fetch chain head")
                }
            })
            .await
    }

    async fn get_contract_abi(&self, address: Felt) -> Result<Option<Value>> {
        let class = self
            .retry_policy
            .execute("get_class_at", || {
                let provider = self.provider.clone();
                async move {
                    match provider
                        .get_class_at(BlockId::Tag(BlockTag::Latest), address)
                        .await
                    {
                        Ok(class) => Ok(Some(class)),
                        Err(ProviderError::StarknetError(StarknetError::ContractNotFound)) => {
                            Ok(None)
                        }
                        Err(e) => Err(anyhow::Error::new(e).context("Failed to fetch class")),
                    }
                }
            })
            .await?;

        class.map(abi_from_class).transpose()
    }
}
