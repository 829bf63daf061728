//! Selector codec.
//!
//! Starknet identifies events and entry points by a selector: the `sn_keccak`
//! hash of the name truncated to 250 bits. Selectors are one-way, naming a
//! selector is always a dictionary lookup (see [`crate::resolver`]).

use starknet::core::types::Felt;
use starknet::core::utils::get_selector_from_name;

/// Namespace separator used by Cairo paths (`dojo::world::Event`).
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Suffix stripped from event names before hashing.
const EVENT_SUFFIX: &str = "Event";

/// Number of hex chars kept in synthetic labels.
const LABEL_HEX_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("cannot compute a selector for an empty name")]
    EmptyName,
    #[error("name {0:?} contains non-ascii characters")]
    NonAsciiName(String),
    #[error("invalid selector {0:?}")]
    InvalidSelector(String),
}

/// Normalizes an event name before hashing.
///
/// Keeps the last namespace segment and strips a trailing `Event` suffix:
/// `Game::MovedEvent` becomes `Moved`, `Transfer` stays `Transfer`.
pub fn normalize_event_name(name: &str) -> &str {
    let last = name.rsplit(NAMESPACE_SEPARATOR).next().unwrap_or(name);
    match last.strip_suffix(EVENT_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => last,
    }
}

/// Computes the selector of an event, normalizing the name first.
pub fn event_selector(name: &str) -> Result<Felt, SelectorError> {
    compute_selector(normalize_event_name(name))
}

/// Computes the selector of a function. Function names are hashed as is.
pub fn function_selector(name: &str) -> Result<Felt, SelectorError> {
    compute_selector(name)
}

fn compute_selector(name: &str) -> Result<Felt, SelectorError> {
    if name.is_empty() {
        return Err(SelectorError::EmptyName);
    }
    get_selector_from_name(name).map_err(|_| SelectorError::NonAsciiName(name.to_string()))
}

/// Parses a hex selector (`0xEE`, `0x00ee`, `ee`) into its canonical value.
pub fn parse_selector(value: &str) -> Result<Felt, SelectorError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SelectorError::InvalidSelector(value.to_string()));
    }
    let prefixed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        format!("0x{}", &trimmed[2..])
    } else {
        format!("0x{trimmed}")
    };
    Felt::from_hex(&prefixed).map_err(|_| SelectorError::InvalidSelector(value.to_string()))
}

/// Canonical textual form of a selector: lowercase, `0x` prefixed, no leading zeros.
pub fn selector_hex(selector: &Felt) -> String {
    format!("{selector:#x}")
}

fn label_hex(selector: &Felt) -> String {
    let hex = format!("{selector:x}");
    hex.chars().take(LABEL_HEX_CHARS).collect()
}

/// Placeholder name for an event selector missing from every dictionary.
pub fn unknown_event_label(selector: &Felt) -> String {
    format!("unknown_{}", label_hex(selector))
}

/// Placeholder name for a function selector missing from every dictionary.
pub fn unknown_function_label(selector: &Felt) -> String {
    format!("function_{}", label_hex(selector))
}
