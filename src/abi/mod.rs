//! ABI schema detection and parsing.
//!
//! Two incompatible metadata documents are accepted:
//! - a Dojo **manifest** (`world` + `contracts` + global `events`),
//! - a Scarb **compiled contract class** (`sierra_program` + `entry_points_by_type` + `abi`).
//!
//! The variant is resolved once into [`AbiDocument`] and parsed by variant
//! specific code. The result is an immutable [`AbiRegistry`].

pub mod contract_class;
pub mod fetch;
pub mod manifest;
pub mod types;

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use starknet::core::types::Felt;

pub use contract_class::ContractClassDocument;
pub use fetch::{events_from_abi, OnchainAbiCache};
pub use manifest::{ManifestDocument, ManifestEvent};
pub use types::{
    extract_events, parse_abi_items, AbiParam, ContractDescriptor, EventDescriptor,
    FunctionDescriptor, SelectorOrigin, UNKNOWN_SENTINEL,
};

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("failed to read ABI file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ABI document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized ABI format: expected a Dojo manifest or a compiled contract class")]
    UnrecognizedFormat,
    #[error("malformed ABI document: {0}")]
    Malformed(String),
}

/// Detected metadata schema.
#[derive(Debug, Clone)]
pub enum AbiDocument {
    Manifest(ManifestDocument),
    ContractClass(ContractClassDocument),
}

impl AbiDocument {
    /// Detects the schema variant from its signature fields.
    pub fn detect(value: Value) -> Result<Self, AbiError> {
        let has = |key: &str| value.get(key).is_some_and(|v| !v.is_null());

        if has("world") && has("contracts") {
            let document = serde_json::from_value(value)
                .map_err(|e| AbiError::Malformed(format!("manifest: {e}")))?;
            Ok(Self::Manifest(document))
        } else if has("sierra_program") && has("entry_points_by_type") {
            let document = serde_json::from_value(value)
                .map_err(|e| AbiError::Malformed(format!("contract class: {e}")))?;
            Ok(Self::ContractClass(document))
        } else {
            Err(AbiError::UnrecognizedFormat)
        }
    }

    pub fn format(&self) -> AbiFormat {
        match self {
            Self::Manifest(_) => AbiFormat::Manifest,
            Self::ContractClass(_) => AbiFormat::ContractClass,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbiFormat {
    Manifest,
    ContractClass,
}

impl std::fmt::Display for AbiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manifest => write!(f, "Dojo manifest"),
            Self::ContractClass => write!(f, "Contract class"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AbiSummary {
    pub format: AbiFormat,
    pub world_kind: Option<String>,
    pub world_class_hash: Option<String>,
    pub version: Option<String>,
    pub contracts: usize,
    pub total_events: usize,
    pub total_functions: usize,
    pub manifest_events: usize,
}

/// Parsed contracts of one ABI load, immutable once built.
#[derive(Debug, Clone)]
pub struct AbiRegistry {
    format: AbiFormat,
    contracts: Vec<ContractDescriptor>,
    index: HashMap<String, usize>,
    manifest_events: Vec<ManifestEvent>,
    world_kind: Option<String>,
    world_class_hash: Option<String>,
    version: Option<String>,
}

/// Lookup key for a contract: canonical hex for addresses, lowercase otherwise.
fn contract_key(value: &str) -> String {
    Felt::from_hex(value).map_or_else(|_| value.to_lowercase(), |felt| format!("{felt:#x}"))
}

impl AbiRegistry {
    /// Reads and parses an ABI file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AbiError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| AbiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw)?;
        let registry = Self::from_value(value, &path.to_string_lossy())?;

        tracing::info!(
            target: "starky::abi",
            path = %path.display(),
            format = %registry.format,
            contracts = registry.contracts.len(),
            "ABI loaded"
        );
        Ok(registry)
    }

    /// Parses an already decoded document. `source` names compiled classes.
    pub fn from_value(value: Value, source: &str) -> Result<Self, AbiError> {
        Self::from_document(AbiDocument::detect(value)?, source)
    }

    pub fn from_document(document: AbiDocument, source: &str) -> Result<Self, AbiError> {
        let format = document.format();
        match document {
            AbiDocument::Manifest(manifest) => {
                let contracts = manifest::parse_manifest(&manifest)?;
                Ok(Self::build(
                    format,
                    contracts,
                    manifest.events,
                    manifest.world.kind,
                    manifest.world.class_hash,
                    None,
                ))
            }
            AbiDocument::ContractClass(class) => {
                let contract = contract_class::parse_contract_class(&class, source)?;
                Ok(Self::build(
                    format,
                    vec![contract],
                    Vec::new(),
                    None,
                    None,
                    class.contract_class_version,
                ))
            }
        }
    }

    fn build(
        format: AbiFormat,
        contracts: Vec<ContractDescriptor>,
        manifest_events: Vec<ManifestEvent>,
        world_kind: Option<String>,
        world_class_hash: Option<String>,
        version: Option<String>,
    ) -> Self {
        let mut index = HashMap::with_capacity(contracts.len());
        for (position, contract) in contracts.iter().enumerate() {
            let key = match contract.address {
                Some(address) => format!("{address:#x}"),
                None => contract.name.to_lowercase(),
            };
            index.insert(key, position);
        }

        Self {
            format,
            contracts,
            index,
            manifest_events,
            world_kind,
            world_class_hash,
            version,
        }
    }

    pub fn format(&self) -> AbiFormat {
        self.format
    }

    pub fn contracts(&self) -> &[ContractDescriptor] {
        &self.contracts
    }

    /// Looks a contract up by address (any hex casing or padding) or class name.
    pub fn contract(&self, address: &str) -> Option<&ContractDescriptor> {
        self.index
            .get(&contract_key(address))
            .map(|&position| &self.contracts[position])
    }

    pub fn all_events(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.contracts.iter().flat_map(|c| c.events.iter())
    }

    pub fn all_functions(&self) -> impl Iterator<Item = &FunctionDescriptor> {
        self.contracts.iter().flat_map(|c| c.functions.iter())
    }

    pub fn manifest_events(&self) -> &[ManifestEvent] {
        &self.manifest_events
    }

    pub fn event_by_selector(&self, selector: &Felt) -> Option<&EventDescriptor> {
        self.all_events().find(|e| e.selector == *selector)
    }

    pub fn function_by_selector(&self, selector: &Felt) -> Option<&FunctionDescriptor> {
        self.all_functions().find(|f| f.selector == *selector)
    }

    /// Addresses of deployed contracts, the `unknown` sentinel excluded.
    pub fn deployable_addresses(&self) -> Vec<Felt> {
        self.contracts.iter().filter_map(|c| c.address).collect()
    }

    pub fn summary(&self) -> AbiSummary {
        AbiSummary {
            format: self.format,
            world_kind: self.world_kind.clone(),
            world_class_hash: self.world_class_hash.clone(),
            version: self.version.clone(),
            contracts: self.contracts.len(),
            total_events: self.all_events().count(),
            total_functions: self.all_functions().count(),
            manifest_events: self.manifest_events.len(),
        }
    }
}
