//! Structured log records produced by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use starknet::core::types::Felt;

/// Record kind, also the log `message` and `type` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    StarknetEvent,
    FunctionCall,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StarknetEvent => "starknet_event",
            Self::FunctionCall => "function_call",
        }
    }
}

/// Static tags shared by every record of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordContext {
    pub service: String,
    pub source: String,
    pub network: String,
}

impl RecordContext {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            service: "starky".to_string(),
            source: "starknet".to_string(),
            network: network.into(),
        }
    }

    fn tags(&self, contract: &Felt) -> Vec<String> {
        vec![
            "app:starky".to_string(),
            format!("network:{}", self.network),
            format!("contract:{contract:#x}"),
        ]
    }
}

impl Default for RecordContext {
    fn default() -> Self {
        Self::new("mainnet")
    }
}

fn felt_hex<S: Serializer>(value: &Felt, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:#x}"))
}

fn felts_hex<S: Serializer>(values: &[Felt], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|v| format!("{v:#x}")))
}

fn comma_joined<S: Serializer>(values: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&values.join(","))
}

/// One named occurrence ready for the log sink. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedLogRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub message: String,
    pub service: String,
    #[serde(rename = "ddsource")]
    pub source: String,
    #[serde(rename = "ddtags", serialize_with = "comma_joined")]
    pub tags: Vec<String>,
    #[serde(serialize_with = "felt_hex")]
    pub contract_address: Felt,
    #[serde(serialize_with = "felt_hex")]
    pub selector: Felt,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(serialize_with = "felts_hex")]
    pub keys: Vec<Felt>,
    #[serde(serialize_with = "felts_hex")]
    pub data: Vec<Felt>,
    pub block_number: Option<u64>,
    #[serde(rename = "tx_hash", serialize_with = "felt_hex")]
    pub transaction_hash: Felt,
    pub timestamp: DateTime<Utc>,
}

impl ProcessedLogRecord {
    pub fn event(
        context: &RecordContext,
        contract_address: Felt,
        selector: Felt,
        name: String,
        keys: Vec<Felt>,
        data: Vec<Felt>,
        block_number: Option<u64>,
        transaction_hash: Felt,
    ) -> Self {
        Self {
            kind: RecordKind::StarknetEvent,
            message: RecordKind::StarknetEvent.as_str().to_string(),
            service: context.service.clone(),
            source: context.source.clone(),
            tags: context.tags(&contract_address),
            contract_address,
            selector,
            event_name: Some(name),
            function_name: None,
            keys,
            data,
            block_number,
            transaction_hash,
            timestamp: Utc::now(),
        }
    }

    pub fn function_call(
        context: &RecordContext,
        contract_address: Felt,
        selector: Felt,
        name: String,
        calldata: Vec<Felt>,
        block_number: Option<u64>,
        transaction_hash: Felt,
    ) -> Self {
        Self {
            kind: RecordKind::FunctionCall,
            message: RecordKind::FunctionCall.as_str().to_string(),
            service: context.service.clone(),
            source: context.source.clone(),
            tags: context.tags(&contract_address),
            contract_address,
            selector,
            event_name: None,
            function_name: Some(name),
            keys: Vec::new(),
            data: calldata,
            block_number,
            transaction_hash,
            timestamp: Utc::now(),
        }
    }

    /// Event or function name, whichever this record carries.
    pub fn resolved_name(&self) -> &str {
        self.event_name
            .as_deref()
            .or(self.function_name.as_deref())
            .unwrap_or_default()
    }
}
