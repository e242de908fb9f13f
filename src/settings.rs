//! Persisted bridge settings: listener config, discovery catalog and engine tuning.
//!
//! Stored as pretty JSON. Every field has a default, so a partial or missing
//! file is fine.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::bridge::BridgeConfig;
use crate::core::catalog::Catalog;
use crate::engine::EngineConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub bridge: BridgeConfig,
    pub catalog: Catalog,
    /// Progress ticks per loopback job
    pub steps: u32,
    pub step_delay_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            bridge: BridgeConfig::default(),
            catalog: Catalog::default(),
            steps: engine.steps,
            step_delay_ms: engine.step_delay.as_millis() as u64,
        }
    }
}

impl BridgeSettings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            steps: self.steps,
            step_delay: Duration::from_millis(self.step_delay_ms),
        }
    }
}
