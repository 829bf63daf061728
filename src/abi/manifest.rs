//! Dojo manifest form: a world, its deployed contracts and manifest-global events.

use serde::Deserialize;
use starknet::core::types::Felt;

use super::types::{
    contract_name, extract_events, extract_functions, parse_abi_items, AbiParam, ContractDescriptor,
    EventDescriptor, SelectorOrigin,
};
use super::AbiError;
use crate::selector::parse_selector;

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestDocument {
    pub world: ManifestWorld,
    pub contracts: Vec<ManifestContract>,
    #[serde(default)]
    pub events: Vec<ManifestEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestWorld {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub class_hash: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestContract {
    pub address: String,
    #[serde(default)]
    pub class_hash: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub abi: Vec<serde_json::Value>,
}

/// Event declared once for the whole deployment, with a pre-computed selector.
///
/// Entries without a tag or selector are skipped, not rejected.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ManifestEvent {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub class_hash: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<serde_json::Value>>,
}

impl ManifestEvent {
    fn params(&self) -> Vec<AbiParam> {
        self.members
            .iter()
            .flatten()
            .filter_map(|m| serde_json::from_value::<AbiParam>(m.clone()).ok())
            .collect()
    }
}

fn parse_felt(field: &str, value: &str) -> Result<Felt, AbiError> {
    Felt::from_hex(value).map_err(|_| AbiError::Malformed(format!("invalid {field} {value:?}")))
}

fn parse_optional_felt(field: &str, value: Option<&String>) -> Result<Option<Felt>, AbiError> {
    value.map(|v| parse_felt(field, v)).transpose()
}

/// Manifest-global events, selectors used verbatim.
pub fn global_events(document: &ManifestDocument) -> Vec<EventDescriptor> {
    document
        .events
        .iter()
        .filter_map(|event| {
            let Some(raw) = event.selector.as_deref().filter(|_| !event.tag.is_empty()) else {
                tracing::warn!(
                    target: "starky::abi",
                    tag = %event.tag,
                    "Skipping manifest event without tag or selector"
                );
                return None;
            };
            Some((event, parse_selector(raw)))
        })
        .filter_map(|(event, selector)| match selector {
            Ok(selector) => Some(EventDescriptor {
                qualified_name: event.tag.clone(),
                name: event.tag.clone(),
                selector,
                inputs: event.params(),
                origin: SelectorOrigin::ManifestGlobal,
            }),
            Err(e) => {
                tracing::warn!(
                    target: "starky::abi",
                    tag = %event.tag,
                    error = %e,
                    "Skipping manifest event with invalid selector"
                );
                None
            }
        })
        .collect()
}

/// Builds one descriptor for the world (if it has an address) and one per contract.
pub fn parse_manifest(document: &ManifestDocument) -> Result<Vec<ContractDescriptor>, AbiError> {
    let globals = global_events(document);
    let mut contracts = Vec::with_capacity(document.contracts.len() + 1);

    if let Some(address) = &document.world.address {
        let world = ContractDescriptor {
            address: Some(parse_felt("world address", address)?),
            class_hash: parse_optional_felt("world class hash", document.world.class_hash.as_ref())?,
            name: "World".to_string(),
            kind: "world".to_string(),
            events: globals.clone(),
            functions: Vec::new(),
        };
        tracing::info!(
            target: "starky::abi",
            address = %world.address_label(),
            events = world.events.len(),
            "Parsed world contract"
        );
        contracts.push(world);
    }

    for contract in &document.contracts {
        let items = parse_abi_items(&contract.abi);
        let mut events = extract_events(&items);
        events.extend(globals.iter().cloned());

        let descriptor = ContractDescriptor {
            address: Some(parse_felt("contract address", &contract.address)?),
            class_hash: parse_optional_felt("class hash", contract.class_hash.as_ref())?,
            name: contract_name(&items),
            kind: contract.kind.clone().unwrap_or_default(),
            events,
            functions: extract_functions(&items),
        };

        tracing::info!(
            target: "starky::abi",
            contract = %descriptor.name,
            address = %descriptor.address_label(),
            events = descriptor.events.len(),
            functions = descriptor.functions.len(),
            "Parsed manifest contract"
        );
        contracts.push(descriptor);
    }

    Ok(contracts)
}
