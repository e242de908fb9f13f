//! Execution engines that consume bridge submissions.
//!
//! The bridge only needs something that takes [`JobSubmission`]s off the
//! dispatcher and eventually calls `finalize`. [`LoopbackEngine`] is the
//! in-process one used by the binary and the tests.
//!
//! [`JobSubmission`]: crate::core::dispatch::JobSubmission

pub mod loopback;

pub use loopback::{EngineConfig, LoopbackEngine};
