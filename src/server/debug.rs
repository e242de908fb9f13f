//! Verbose body logging. Image fields are cut short so a log line stays readable.

use log::{info, warn};
use serde_json::Value;

/// Fields holding base64 image data.
const IMAGE_KEYS: [&str; 4] = ["images", "image", "mask", "init_images"];
const IMAGE_LIMIT: usize = 30;
const FIELD_LIMIT: usize = 500;

/// Render `value` compactly, keeping at most `limit` characters.
pub fn truncate(value: &Value, limit: usize) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() <= limit {
        text
    } else {
        let mut cut: String = text.chars().take(limit).collect();
        cut.push_str("...");
        cut
    }
}

pub fn field_limit(key: &str) -> usize {
    if IMAGE_KEYS.contains(&key) { IMAGE_LIMIT } else { FIELD_LIMIT }
}

/// One line per top-level field (a single line for non-objects), then the serialized size.
pub fn log_document(label: &str, doc: &Value) {
    match doc {
        Value::Object(map) => {
            info!("{}: {} field(s)", label, map.len());
            for (key, value) in map {
                info!("  {}: {}", key, truncate(value, field_limit(key)));
            }
        }
        other => info!("{}: {}", label, truncate(other, FIELD_LIMIT)),
    }
    match serde_json::to_vec(doc) {
        Ok(bytes) => info!("{}: serializes to {} bytes", label, bytes.len()),
        Err(e) => warn!("{}: does not serialize: {}", label, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_fields_cut_at_30() {
        let long = "A".repeat(100);
        let out = truncate(&json!(long), field_limit("init_images"));
        assert_eq!(out, format!("{}...", "A".repeat(30)));
        assert_eq!(field_limit("mask"), 30);
        assert_eq!(field_limit("prompt"), 500);
    }

    #[test]
    fn test_short_values_untouched() {
        assert_eq!(truncate(&json!("cat"), 30), "cat");
        assert_eq!(truncate(&json!(7), 30), "7");
        assert_eq!(truncate(&json!(["a"]), 30), "[\"a\"]");
    }

    #[test]
    fn test_multibyte_safe() {
        let out = truncate(&json!("ééééé"), 2);
        assert_eq!(out, "éé...");
    }
}
