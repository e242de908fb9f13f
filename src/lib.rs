//! sdapi-bridge - synchronous sdapi REST surface over an asynchronous job engine
//!
//! Re-exports all modules for use by the binary target.

// Bridge state independent of the HTTP layer
pub mod core;

pub mod bridge;
pub mod cli;
pub mod codec;
pub mod config;
pub mod engine;
pub mod server;
pub mod settings;

// Re-export commonly used types
pub use bridge::{BridgeConfig, BridgeManager, BridgeState};
pub use core::dispatch::{ChannelDispatcher, JobDispatcher, JobSubmission};
pub use core::error::{BridgeError, Result};
pub use core::request::{BridgeRequest, RequestId};
pub use engine::{EngineConfig, LoopbackEngine};
pub use settings::BridgeSettings;
