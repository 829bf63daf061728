//! On-chain ABI lookup for contracts configured without an ABI file.

use std::collections::HashMap;

use starknet::core::types::Felt;

use super::types::{extract_events, parse_abi_items, EventDescriptor};
use crate::etl::extractor::DataSource;

/// Event lists fetched from chain, one entry per address attempted.
#[derive(Debug, Default)]
pub struct OnchainAbiCache {
    events: HashMap<Felt, Vec<EventDescriptor>>,
}

impl OnchainAbiCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the class of every address not already cached.
    ///
    /// Failures cache an empty list so the address is not fetched again.
    pub async fn fetch_all(&mut self, source: &dyn DataSource, addresses: &[Felt]) {
        for address in addresses {
            if self.events.contains_key(address) {
                continue;
            }

            let events = match source.get_contract_abi(*address).await {
                Ok(Some(abi)) => {
                    let events = events_from_abi(&abi);
                    tracing::info!(
                        target: "starky::abi::fetch",
                        address = %format!("{address:#x}"),
                        events = events.len(),
                        "Fetched contract ABI"
                    );
                    events
                }
                Ok(None) => {
                    tracing::warn!(
                        target: "starky::abi::fetch",
                        address = %format!("{address:#x}"),
                        "No class deployed at address"
                    );
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!(
                        target: "starky::abi::fetch",
                        address = %format!("{address:#x}"),
                        error = %format!("{e:#}"),
                        "Failed to fetch contract ABI"
                    );
                    Vec::new()
                }
            };

            self.events.insert(*address, events);
        }
    }

    pub fn events(&self, address: &Felt) -> Option<&[EventDescriptor]> {
        self.events.get(address).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Felt, &[EventDescriptor])> {
        self.events.iter().map(|(a, e)| (a, e.as_slice()))
    }
}

/// Event descriptors of a bare ABI array. Anything else yields nothing.
pub fn events_from_abi(abi: &serde_json::Value) -> Vec<EventDescriptor> {
    abi.as_array()
        .map(|values| extract_events(&parse_abi_items(values)))
        .unwrap_or_default()
}
