//! Typed contract descriptors and the serde shapes of Cairo ABI items.

use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

use crate::selector::{event_selector, function_selector, parse_selector};

/// Rendering of a missing address or class hash.
pub const UNKNOWN_SENTINEL: &str = "unknown";

/// How an event selector was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorOrigin {
    /// Hashed from the normalized event name.
    Computed,
    /// Read from a `selector` field on the ABI item.
    Embedded,
    /// Declared once at manifest level, used verbatim.
    ManifestGlobal,
}

/// A named, typed parameter (`{name, type}`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDescriptor {
    /// Name as declared in the ABI (`Game::MovedEvent`) or the manifest tag.
    pub qualified_name: String,
    /// Name used for display and dictionaries.
    pub name: String,
    pub selector: Felt,
    pub inputs: Vec<AbiParam>,
    pub origin: SelectorOrigin,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub selector: Felt,
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<AbiParam>,
    pub state_mutability: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractDescriptor {
    /// Deployed address, `None` for a compiled class that has not been deployed.
    pub address: Option<Felt>,
    pub class_hash: Option<Felt>,
    pub name: String,
    pub kind: String,
    pub events: Vec<EventDescriptor>,
    pub functions: Vec<FunctionDescriptor>,
}

impl ContractDescriptor {
    /// Address as text, `unknown` when not deployed.
    pub fn address_label(&self) -> String {
        self.address
            .map_or_else(|| UNKNOWN_SENTINEL.to_string(), |a| format!("{a:#x}"))
    }

    pub fn class_hash_label(&self) -> String {
        self.class_hash
            .map_or_else(|| UNKNOWN_SENTINEL.to_string(), |c| format!("{c:#x}"))
    }

    pub fn is_deployed(&self) -> bool {
        self.address.is_some()
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.events.iter().any(|e| e.name == name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }
}

/// One entry of a Cairo ABI array.
///
/// Only the item kinds that carry names or selectors are modeled, the rest
/// (structs, enums, ...) deserialize into [`AbiItem::Other`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbiItem {
    Function(AbiFunction),
    Interface(AbiInterface),
    Impl(AbiImpl),
    Event(AbiEvent),
    L1Handler(AbiFunction),
    Constructor(AbiConstructor),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    #[serde(default)]
    pub state_mutability: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiConstructor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiInterface {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub items: Vec<AbiItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiImpl {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interface_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiEvent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub members: Vec<AbiParam>,
    #[serde(default)]
    pub variants: Vec<AbiParam>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

impl AbiEvent {
    fn params(&self) -> Vec<AbiParam> {
        [&self.members, &self.variants, &self.inputs]
            .into_iter()
            .find(|p| !p.is_empty())
            .cloned()
            .unwrap_or_default()
    }
}

/// Parses a raw ABI array leniently: items that fail to deserialize are dropped.
pub fn parse_abi_items(values: &[serde_json::Value]) -> Vec<AbiItem> {
    values
        .iter()
        .filter_map(|value| match serde_json::from_value::<AbiItem>(value.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::debug!(target: "starky::abi", error = %e, "Skipping unreadable ABI item");
                None
            }
        })
        .collect()
}

/// Extracts event descriptors from an ABI.
///
/// Uses the embedded selector when present, else hashes the normalized name.
/// Items whose selector cannot be obtained are skipped.
pub fn extract_events(items: &[AbiItem]) -> Vec<EventDescriptor> {
    items
        .iter()
        .filter_map(|item| match item {
            AbiItem::Event(event) if !event.name.is_empty() => event_descriptor(event),
            _ => None,
        })
        .collect()
}

fn event_descriptor(event: &AbiEvent) -> Option<EventDescriptor> {
    let name = crate::selector::normalize_event_name(&event.name).to_string();
    let (selector, origin) = match &event.selector {
        Some(raw) => (parse_selector(raw), SelectorOrigin::Embedded),
        None => (event_selector(&event.name), SelectorOrigin::Computed),
    };

    match selector {
        Ok(selector) => Some(EventDescriptor {
            qualified_name: event.name.clone(),
            name,
            selector,
            inputs: event.params(),
            origin,
        }),
        Err(e) => {
            tracing::warn!(
                target: "starky::abi",
                event = %event.name,
                error = %e,
                "Failed to get selector for event"
            );
            None
        }
    }
}

/// Extracts function descriptors from direct function items and interface groups.
pub fn extract_functions(items: &[AbiItem]) -> Vec<FunctionDescriptor> {
    let mut functions = Vec::new();
    for item in items {
        match item {
            AbiItem::Function(function) => functions.extend(function_descriptor(function)),
            AbiItem::Interface(interface) => {
                for inner in &interface.items {
                    if let AbiItem::Function(function) = inner {
                        functions.extend(function_descriptor(function));
                    }
                }
            }
            _ => {}
        }
    }
    functions
}

fn function_descriptor(function: &AbiFunction) -> Option<FunctionDescriptor> {
    match function_selector(&function.name) {
        Ok(selector) => Some(FunctionDescriptor {
            name: function.name.clone(),
            selector,
            inputs: function.inputs.clone(),
            outputs: function.outputs.clone(),
            state_mutability: function
                .state_mutability
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        }),
        Err(e) => {
            tracing::warn!(
                target: "starky::abi",
                function = %function.name,
                error = %e,
                "Failed to calculate selector for function"
            );
            None
        }
    }
}

/// Functions declared inside interface groups, in declaration order.
pub fn interface_functions(items: &[AbiItem]) -> Vec<&AbiFunction> {
    items
        .iter()
        .filter_map(|item| match item {
            AbiItem::Interface(interface) => Some(&interface.items),
            _ => None,
        })
        .flatten()
        .filter_map(|item| match item {
            AbiItem::Function(function) => Some(function),
            _ => None,
        })
        .collect()
}

/// Contract name from the first `impl` item, or the last segment of an `interface` name.
pub fn contract_name(items: &[AbiItem]) -> String {
    for item in items {
        match item {
            AbiItem::Impl(imp) if !imp.name.is_empty() => return imp.name.clone(),
            AbiItem::Interface(interface) if !interface.name.is_empty() => {
                return interface
                    .name
                    .rsplit(crate::selector::NAMESPACE_SEPARATOR)
                    .next()
                    .unwrap_or("Unknown")
                    .to_string();
            }
            _ => {}
        }
    }
    "Unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(value: serde_json::Value) -> Vec<AbiItem> {
        parse_abi_items(value.as_array().unwrap())
    }

    #[test]
    fn test_descriptor_labels() {
        let mut contract = ContractDescriptor {
            address: Some(Felt::from(0xc1u64)),
            class_hash: None,
            name: "Game".to_string(),
            kind: "contract".to_string(),
            events: Vec::new(),
            functions: Vec::new(),
        };
        assert!(contract.is_deployed());
        assert_eq!(contract.address_label(), "0xc1");
        assert_eq!(contract.class_hash_label(), UNKNOWN_SENTINEL);

        contract.address = None;
        contract.class_hash = Some(Felt::TWO);
        assert!(!contract.is_deployed());
        assert_eq!(contract.address_label(), UNKNOWN_SENTINEL);
        assert_eq!(contract.class_hash_label(), "0x2");
    }

    #[test]
    fn test_unmodeled_items_are_other() {
        let parsed = items(json!([
            {"type": "struct", "name": "core::integer::u256", "members": []},
            {"type": "enum", "name": "core::bool", "variants": []},
            {"type": "function", "name": "attack", "inputs": [], "outputs": []}
        ]));
        assert!(matches!(parsed[0], AbiItem::Other));
        assert!(matches!(parsed[1], AbiItem::Other));
        assert!(matches!(parsed[2], AbiItem::Function(_)));
    }

    #[test]
    fn test_extract_events_prefers_embedded_selector() {
        let parsed = items(json!([
            {"type": "event", "name": "Game::MovedEvent", "kind": "struct",
             "members": [{"name": "player", "type": "ContractAddress", "kind": "key"}]},
            {"type": "event", "name": "Spawned", "selector": "0xABC"}
        ]));
        let events = extract_events(&parsed);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "Moved");
        assert_eq!(events[0].qualified_name, "Game::MovedEvent");
        assert_eq!(events[0].selector, event_selector("Moved").unwrap());
        assert_eq!(events[0].origin, SelectorOrigin::Computed);
        assert_eq!(events[0].inputs[0].name, "player");
        assert_eq!(events[1].selector, Felt::from(0xabcu64));
        assert_eq!(events[1].origin, SelectorOrigin::Embedded);
    }

    #[test]
    fn test_bad_selector_skips_only_that_event() {
        let parsed = items(json!([
            {"type": "event", "name": "Broken", "selector": "0xnothex"},
            {"type": "event", "name": "Fine"}
        ]));
        let events = extract_events(&parsed);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Fine");
    }

    #[test]
    fn test_extract_functions_scans_interfaces() {
        let parsed = items(json!([
            {"type": "function", "name": "attack", "state_mutability": "external"},
            {"type": "interface", "name": "game::IActions", "items": [
                {"type": "function", "name": "move", "inputs": [{"name": "dir", "type": "u8"}]}
            ]}
        ]));
        let functions = extract_functions(&parsed);
        let names: Vec<_> = functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["attack", "move"]);
        assert_eq!(functions[0].state_mutability, "external");
        assert_eq!(functions[1].state_mutability, "unknown");
        assert_eq!(functions[1].selector, function_selector("move").unwrap());
    }

    #[test]
    fn test_contract_name() {
        assert_eq!(
            contract_name(&items(json!([
                {"type": "impl", "name": "ActionsImpl", "interface_name": "game::IActions"}
            ]))),
            "ActionsImpl"
        );
        assert_eq!(
            contract_name(&items(json!([
                {"type": "interface", "name": "game::systems::IActions", "items": []}
            ]))),
            "IActions"
        );
        assert_eq!(contract_name(&[]), "Unknown");
    }
}
