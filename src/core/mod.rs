//! Core bridge modules - request table, completion latch, progress, dispatch
//!
//! These modules hold the bridge state, independent of the HTTP server.

pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod latch;
pub mod params;
pub mod pending;
pub mod progress;
pub mod request;
pub mod routes;
pub mod shared;

// Re-exports for convenience
pub use catalog::{Catalog, PromptStyle};
pub use latch::CompletionLatch;
pub use pending::PendingRequests;
pub use progress::{ProgressReport, ProgressTracker};
pub use shared::{BridgeShared, JobTarget};
