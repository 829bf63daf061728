//! Compiled (Sierra) contract class form, as emitted by Scarb.
//!
//! A class has no deployed address. Function names come from matching the
//! entry point table against the flat ABI.

use serde::Deserialize;

use super::types::{
    extract_events, interface_functions, parse_abi_items, AbiItem, AbiParam, ContractDescriptor,
    FunctionDescriptor,
};
use super::AbiError;
use crate::selector::parse_selector;

const CONTRACT_CLASS_SUFFIX: &str = ".contract_class.json";

#[derive(Debug, Clone, Deserialize)]
pub struct ContractClassDocument {
    pub sierra_program: Vec<serde_json::Value>,
    #[serde(default)]
    pub contract_class_version: Option<String>,
    pub entry_points_by_type: EntryPointsByType,
    #[serde(default)]
    pub abi: Option<FlatAbi>,
}

/// The ABI is an array in Scarb artifacts and a JSON string over RPC.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlatAbi {
    Items(Vec<serde_json::Value>),
    Encoded(String),
}

impl FlatAbi {
    pub fn values(&self) -> Result<Vec<serde_json::Value>, AbiError> {
        match self {
            Self::Items(values) => Ok(values.clone()),
            Self::Encoded(raw) => serde_json::from_str(raw)
                .map_err(|e| AbiError::Malformed(format!("encoded abi: {e}"))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryPointsByType {
    #[serde(rename = "EXTERNAL", default)]
    pub external: Vec<EntryPoint>,
    #[serde(rename = "L1_HANDLER", default)]
    pub l1_handler: Vec<EntryPoint>,
    #[serde(rename = "CONSTRUCTOR", default)]
    pub constructor: Vec<EntryPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryPoint {
    pub selector: String,
    pub function_idx: usize,
}

/// Logical contract name derived from the artifact file name.
pub fn class_name_from_source(source: &str) -> String {
    let file_name = std::path::Path::new(source)
        .file_name()
        .map_or_else(|| source.to_string(), |n| n.to_string_lossy().to_string());

    if let Some(stripped) = file_name.strip_suffix(CONTRACT_CLASS_SUFFIX) {
        return stripped.to_string();
    }
    std::path::Path::new(&file_name)
        .file_stem()
        .map_or(file_name.clone(), |s| s.to_string_lossy().to_string())
}

struct NamedEntry<'a> {
    name: &'a str,
    inputs: &'a [AbiParam],
    outputs: &'a [AbiParam],
    state_mutability: Option<&'a str>,
}

fn entry_function(
    entry: &EntryPoint,
    named: Option<NamedEntry<'_>>,
    default_mutability: &str,
) -> Option<FunctionDescriptor> {
    let selector = match parse_selector(&entry.selector) {
        Ok(selector) => selector,
        Err(e) => {
            tracing::warn!(
                target: "starky::abi",
                function_idx = entry.function_idx,
                error = %e,
                "Skipping entry point with invalid selector"
            );
            return None;
        }
    };

    Some(match named {
        Some(named) if !named.name.is_empty() => FunctionDescriptor {
            name: named.name.to_string(),
            selector,
            inputs: named.inputs.to_vec(),
            outputs: named.outputs.to_vec(),
            state_mutability: named
                .state_mutability
                .unwrap_or(default_mutability)
                .to_string(),
        },
        _ => FunctionDescriptor {
            name: format!("function_{}", entry.function_idx),
            selector,
            inputs: Vec::new(),
            outputs: Vec::new(),
            state_mutability: default_mutability.to_string(),
        },
    })
}

/// Parses a compiled class into a single undeployed contract descriptor.
pub fn parse_contract_class(
    document: &ContractClassDocument,
    source: &str,
) -> Result<ContractDescriptor, AbiError> {
    let values = match &document.abi {
        Some(abi) => abi.values()?,
        None => Vec::new(),
    };
    let items = parse_abi_items(&values);

    let externals = interface_functions(&items);
    let l1_handlers: Vec<_> = items
        .iter()
        .filter_map(|i| match i {
            AbiItem::L1Handler(f) => Some(f),
            _ => None,
        })
        .collect();
    let constructors: Vec<_> = items
        .iter()
        .filter_map(|i| match i {
            AbiItem::Constructor(c) => Some(c),
            _ => None,
        })
        .collect();

    let mut functions = Vec::new();

    for entry in &document.entry_points_by_type.external {
        let named = externals.get(entry.function_idx).map(|f| NamedEntry {
            name: &f.name,
            inputs: &f.inputs,
            outputs: &f.outputs,
            state_mutability: f.state_mutability.as_deref(),
        });
        functions.extend(entry_function(entry, named, "external"));
    }

    for (position, entry) in document.entry_points_by_type.l1_handler.iter().enumerate() {
        let named = l1_handlers.get(position).map(|f| NamedEntry {
            name: &f.name,
            inputs: &f.inputs,
            outputs: &f.outputs,
            state_mutability: None,
        });
        functions.extend(entry_function(entry, named, "l1_handler"));
    }

    for (position, entry) in document.entry_points_by_type.constructor.iter().enumerate() {
        let named = constructors.get(position).map(|c| NamedEntry {
            name: &c.name,
            inputs: &c.inputs,
            outputs: &[],
            state_mutability: None,
        });
        functions.extend(entry_function(entry, named, "constructor"));
    }

    let descriptor = ContractDescriptor {
        address: None,
        class_hash: None,
        name: class_name_from_source(source),
        kind: "ContractClass".to_string(),
        events: extract_events(&items),
        functions,
    };

    tracing::info!(
        target: "starky::abi",
        contract = %descriptor.name,
        version = document.contract_class_version.as_deref().unwrap_or("unknown"),
        events = descriptor.events.len(),
        functions = descriptor.functions.len(),
        "Parsed contract class"
    );

    Ok(descriptor)
}
