//! One accepted REST call awaiting a result.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::catalog::PromptStyle;
use super::latch::CompletionLatch;
use super::routes::CommandPath;

/// Identifier handed to the execution engine as correlation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Bare number on the wire
impl Serialize for RequestId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        u64::deserialize(d).map(RequestId)
    }
}

/// Side-channel key for the style presets attached at checkout.
pub const EXTRA_STYLES: &str = "styles";
/// Side-channel key for the checkpoint names attached at checkout.
pub const EXTRA_CHECKPOINTS: &str = "checkpoints";

/// A pending command. Shared between the HTTP handler blocked in [`wait`](Self::wait)
/// and whichever engine thread eventually calls [`finalize`](Self::finalize).
pub struct BridgeRequest {
    id: RequestId,
    command: CommandPath,
    payload: Value,
    extra: Mutex<Map<String, Value>>,
    output: CompletionLatch<Value>,
}

impl BridgeRequest {
    pub(crate) fn new(id: RequestId, command: CommandPath, payload: Value) -> Self {
        Self {
            id,
            command,
            payload,
            extra: Mutex::new(Map::new()),
            output: CompletionLatch::new(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn command(&self) -> CommandPath {
        self.command
    }

    /// Decoded request body as sent by the client.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// True iff this request was made against `command`. Consumers use it to decide
    /// whether they are the intended handler of a shared "current request".
    pub fn is_command(&self, command: CommandPath) -> bool {
        self.command == command
    }

    /// Store the result and unblock the waiting handler. Last write wins.
    pub fn finalize(&self, output: Value) {
        self.output.set(output);
    }

    pub fn is_finalized(&self) -> bool {
        self.output.is_set()
    }

    /// Block until finalized. No timeout; shutdown force-finalizes instead.
    pub fn wait(&self) -> Value {
        self.output.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Value> {
        self.output.wait_timeout(timeout)
    }

    // ========== Side channel ==========

    pub fn set_extra(&self, key: &str, value: Value) {
        self.extra
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
    }

    pub fn extra(&self, key: &str) -> Option<Value> {
        self.extra
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Style named `name`, if the client selected it and the attached catalog defines it.
    pub fn style(&self, name: &str) -> Option<PromptStyle> {
        let selected = self.payload.get("styles")?.as_array()?;
        if !selected.iter().any(|s| s.as_str() == Some(name)) {
            return None;
        }
        let styles = self.extra(EXTRA_STYLES)?;
        serde_json::from_value(styles.get(name)?.clone()).ok()
    }

    /// Compare the client's selected checkpoint against `pattern`.
    ///
    /// Exact match by default; with `use_regex` the pattern is searched anywhere in
    /// the name and an invalid pattern never matches.
    pub fn checkpoint_matches(&self, pattern: &str, use_regex: bool) -> bool {
        let selected = self
            .payload
            .get("checkpoint")
            .and_then(Value::as_str)
            .unwrap_or("");
        if use_regex {
            Regex::new(pattern).is_ok_and(|re| re.is_match(selected))
        } else {
            pattern == selected
        }
    }
}

impl fmt::Debug for BridgeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRequest")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(payload: Value) -> BridgeRequest {
        BridgeRequest::new(RequestId(1), CommandPath::Txt2Img, payload)
    }

    #[test]
    fn test_is_command() {
        let r = request(json!({}));
        assert!(r.is_command(CommandPath::Txt2Img));
        assert!(!r.is_command(CommandPath::Img2Img));
    }

    #[test]
    fn test_finalize_then_wait() {
        let r = request(json!({}));
        assert!(!r.is_finalized());
        r.finalize(json!({"caption": "x"}));
        r.finalize(json!({"caption": "y"}));
        assert_eq!(r.wait(), json!({"caption": "y"}));
    }

    #[test]
    fn test_style_needs_selection_and_definition() {
        let r = request(json!({"styles": ["noir", "missing"]}));
        r.set_extra(
            EXTRA_STYLES,
            json!({
                "noir": {"name": "noir", "prompt": "black and white", "negative_prompt": "colour"},
                "pastel": {"name": "pastel", "prompt": "soft", "negative_prompt": ""},
            }),
        );
        assert_eq!(r.style("noir").unwrap().prompt, "black and white");
        assert!(r.style("pastel").is_none(), "defined but not selected");
        assert!(r.style("missing").is_none(), "selected but not defined");
    }

    #[test]
    fn test_style_without_styles_field() {
        let r = request(json!({}));
        assert!(r.style("noir").is_none());
    }

    #[test]
    fn test_checkpoint_matching() {
        let r = request(json!({"checkpoint": "sdxl-inpainting.safetensors"}));
        assert!(r.checkpoint_matches("sdxl-inpainting.safetensors", false));
        assert!(!r.checkpoint_matches("sdxl", false));
        assert!(r.checkpoint_matches("(?i)INPAINT", true));
        assert!(!r.checkpoint_matches("([", true));

        let none = request(json!({}));
        assert!(none.checkpoint_matches("", false));
    }
}
