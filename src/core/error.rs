//! Error taxonomy for the bridge.

use thiserror::Error;

use super::request::RequestId;

/// Errors raised by the bridge core and mapped onto HTTP replies by the server.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Listener could not acquire its socket. The manager stays `Stopped`.
    #[error("Could not bind API server on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// Client hit a path outside the supported command/query set.
    #[error("Command not found")]
    UnknownPath(String),

    /// Body is not valid JSON or lacks a field the command needs.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Completion arrived for a request that is no longer pending.
    #[error("Request {0} is no longer pending")]
    StaleFinalize(RequestId),

    /// Execution engine refused or dropped the submission.
    #[error("Job dispatch failed: {0}")]
    Dispatch(String),

    /// Bridge is stopping; no new requests are admitted.
    #[error("API server is shutting down")]
    ShuttingDown,

    /// Image payload could not be decoded or encoded.
    #[error("Image codec error: {0}")]
    Codec(String),
}

impl BridgeError {
    /// HTTP status the REST layer answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::UnknownPath(_) => 404,
            BridgeError::MalformedPayload(_) | BridgeError::Codec(_) => 400,
            BridgeError::ShuttingDown | BridgeError::Dispatch(_) => 503,
            BridgeError::Bind { .. } | BridgeError::StaleFinalize(_) => 500,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::MalformedPayload(e.to_string())
    }
}

impl From<image::ImageError> for BridgeError {
    fn from(e: image::ImageError) -> Self {
        BridgeError::Codec(e.to_string())
    }
}

impl From<base64::DecodeError> for BridgeError {
    fn from(e: base64::DecodeError) -> Self {
        BridgeError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
