//! Masked previews of outgoing entries.

use serde_json::Value;

const MASK_KEEP_CHARS: usize = 10;
const MASKED_FIELDS: [&str; 2] = ["tx_hash", "contract_address"];

/// Keeps the first 10 characters and appends an ellipsis.
pub fn mask_value(value: &str) -> String {
    let kept: String = value.chars().take(MASK_KEEP_CHARS).collect();
    format!("{kept}…")
}

/// Entry as shown in verbose logs. Hash and address fields are masked when `mask` is set.
pub fn preview_record(entry: &Value, mask: bool) -> Value {
    let mut shown = entry.clone();
    if !mask {
        return shown;
    }
    if let Some(object) = shown.as_object_mut() {
        for field in MASKED_FIELDS {
            if let Some(Value::String(raw)) = object.get_mut(field) {
                *raw = mask_value(raw);
            }
        }
    }
    shown
}
