//! Selector → name resolution.
//!
//! [`NameResolver`] owns one [`SelectorDictionary`] per namespace (events,
//! functions) plus the per-contract event lists used for context lookups.
//! It is built once before ingestion starts and only read afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

use crate::abi::{AbiRegistry, EventDescriptor, SelectorOrigin};
use crate::selector::{event_selector, parse_selector, selector_hex};

/// User supplied selector → name pair, applied after everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEventMapping {
    pub selector: String,
    pub name: String,
}

/// Paired name→selector and selector→name maps for one namespace.
#[derive(Debug, Clone, Default)]
pub struct SelectorDictionary {
    by_name: HashMap<String, Felt>,
    by_selector: HashMap<Felt, String>,
}

impl SelectorDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts both directions at once. A later insert for the same selector wins.
    pub fn insert(&mut self, name: impl Into<String>, selector: Felt) {
        let name = name.into();
        if let Some(previous) = self.by_selector.get(&selector) {
            if *previous != name {
                tracing::debug!(
                    target: "starky::resolver",
                    selector = %selector_hex(&selector),
                    previous = %previous,
                    name = %name,
                    "Selector remapped, last write wins"
                );
            }
        }
        self.by_name.insert(name.clone(), selector);
        self.by_selector.insert(selector, name);
    }

    pub fn name(&self, selector: &Felt) -> Option<&str> {
        self.by_selector.get(selector).map(String::as_str)
    }

    pub fn selector(&self, name: &str) -> Option<Felt> {
        self.by_name.get(name).copied()
    }

    pub fn contains_selector(&self, selector: &Felt) -> bool {
        self.by_selector.contains_key(selector)
    }

    pub fn len(&self) -> usize {
        self.by_selector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_selector.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_selector.values().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    events: SelectorDictionary,
    functions: SelectorDictionary,
    contract_events: HashMap<Felt, Vec<(Felt, String)>>,
}

impl NameResolver {
    /// Builds the dictionaries from a parsed ABI.
    ///
    /// Insertion order: computed and embedded entries, then manifest-global
    /// events, then manual overrides.
    pub fn from_registry(registry: &AbiRegistry, overrides: &[ManualEventMapping]) -> Self {
        let mut resolver = Self::default();

        for contract in registry.contracts() {
            for event in contract
                .events
                .iter()
                .filter(|e| e.origin != SelectorOrigin::ManifestGlobal)
            {
                resolver.events.insert(event.name.clone(), event.selector);
            }
            for function in &contract.functions {
                resolver.functions.insert(function.name.clone(), function.selector);
            }
            if let Some(address) = contract.address {
                resolver.attach_contract_events(address, &contract.events);
            }
        }

        for event in registry
            .all_events()
            .filter(|e| e.origin == SelectorOrigin::ManifestGlobal)
        {
            resolver.events.insert(event.name.clone(), event.selector);
        }

        resolver.apply_overrides(overrides);

        tracing::info!(
            target: "starky::resolver",
            events = resolver.events.len(),
            functions = resolver.functions.len(),
            contracts = resolver.contract_events.len(),
            "Selector dictionaries built"
        );
        resolver
    }

    /// Legacy mode: a flat list of known event names, no ABI.
    pub fn from_event_names<S: AsRef<str>>(names: &[S], overrides: &[ManualEventMapping]) -> Self {
        let mut resolver = Self::default();
        for name in names {
            let name = name.as_ref();
            match event_selector(name) {
                Ok(selector) => {
                    tracing::debug!(
                        target: "starky::resolver",
                        name = %name,
                        selector = %selector_hex(&selector),
                        "Auto-mapped event name"
                    );
                    resolver.events.insert(name, selector);
                }
                Err(e) => tracing::warn!(
                    target: "starky::resolver",
                    name = %name,
                    error = %e,
                    "Failed to map event name"
                ),
            }
        }
        resolver.apply_overrides(overrides);
        resolver
    }

    fn apply_overrides(&mut self, overrides: &[ManualEventMapping]) {
        for mapping in overrides {
            match parse_selector(&mapping.selector) {
                Ok(selector) => self.events.insert(mapping.name.clone(), selector),
                Err(e) => tracing::warn!(
                    target: "starky::resolver",
                    name = %mapping.name,
                    error = %e,
                    "Ignoring manual mapping with invalid selector"
                ),
            }
        }
    }

    fn attach_contract_events(&mut self, address: Felt, events: &[EventDescriptor]) {
        self.contract_events
            .entry(address)
            .or_default()
            .extend(events.iter().map(|e| (e.selector, e.name.clone())));
    }

    /// Adds a contract's own event list, e.g. from a per-contract ABI.
    ///
    /// These events become known globally too, but never override an entry
    /// that is already present.
    pub fn with_contract_events(mut self, address: Felt, events: &[EventDescriptor]) -> Self {
        for event in events {
            if !self.events.contains_selector(&event.selector) {
                self.events.insert(event.name.clone(), event.selector);
            }
        }
        self.attach_contract_events(address, events);
        self
    }

    pub fn events(&self) -> &SelectorDictionary {
        &self.events
    }

    pub fn functions(&self) -> &SelectorDictionary {
        &self.functions
    }

    /// Event name for a selector, or the selector echoed back as hex.
    ///
    /// Use [`Self::is_known_selector`] to tell a resolution from an echo.
    pub fn resolve_event_name(&self, selector: &Felt) -> String {
        self.events
            .name(selector)
            .map_or_else(|| selector_hex(selector), str::to_string)
    }

    /// Like [`Self::resolve_event_name`], falling back to the emitting contract's own events.
    pub fn resolve_event_name_with_contract_context(&self, selector: &Felt, contract: &Felt) -> String {
        if let Some(name) = self.events.name(selector) {
            return name.to_string();
        }
        self.contract_events
            .get(contract)
            .and_then(|events| events.iter().rev().find(|(s, _)| s == selector))
            .map_or_else(|| selector_hex(selector), |(_, name)| name.clone())
    }

    pub fn resolve_function_name(&self, selector: &Felt) -> Option<&str> {
        self.functions.name(selector)
    }

    pub fn is_known_selector(&self, selector: &Felt) -> bool {
        self.events.contains_selector(selector)
    }

    pub fn is_known_function(&self, selector: &Felt) -> bool {
        self.functions.contains_selector(selector)
    }

    pub fn event_selector_for(&self, name: &str) -> Option<Felt> {
        self.events.selector(name)
    }

    pub fn function_selector_for(&self, name: &str) -> Option<Felt> {
        self.functions.selector(name)
    }

    /// Whether a per-contract event list recognizes this selector.
    pub fn is_known_for_contract(&self, selector: &Felt, contract: &Felt) -> bool {
        self.is_known_selector(selector)
            || self
                .contract_events
                .get(contract)
                .is_some_and(|events| events.iter().any(|(s, _)| s == selector))
    }
}
