//! Discovery data served to the client: prompt style presets and checkpoint names.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name used when no checkpoint list is configured.
pub const PLACEHOLDER_CHECKPOINT: &str = "Placeholder_Checkpoint_Name";

/// Saved prompt preset, listed by `/sdapi/v1/prompt-styles` and selectable per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptStyle {
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    /// Insertion ordered; redefining a name replaces it in place
    pub styles: IndexMap<String, PromptStyle>,
    pub checkpoints: Vec<String>,
}

impl Catalog {
    pub fn define_style(&mut self, name: &str, prompt: &str, negative_prompt: &str) {
        self.styles.insert(
            name.to_string(),
            PromptStyle {
                name: name.to_string(),
                prompt: prompt.to_string(),
                negative_prompt: negative_prompt.to_string(),
            },
        );
    }

    /// Append one checkpoint per line, skipping blanks and names already listed.
    pub fn add_checkpoints(&mut self, names: &str) {
        for name in names.lines().map(str::trim).filter(|n| !n.is_empty()) {
            if !self.checkpoints.iter().any(|c| c == name) {
                self.checkpoints.push(name.to_string());
            }
        }
    }

    /// Checkpoints to advertise, falling back to the placeholder.
    pub fn advertised_checkpoints(&self) -> Vec<String> {
        if self.checkpoints.is_empty() {
            vec![PLACEHOLDER_CHECKPOINT.to_string()]
        } else {
            self.checkpoints.clone()
        }
    }

    pub fn style(&self, name: &str) -> Option<&PromptStyle> {
        self.styles.get(name)
    }
}
