//! Forwarder error types.

use thiserror::Error;

use crate::forwarding::RuleId;

/// Errors surfaced by the rule store, the management interface and settings.
///
/// Routing itself never produces one of these for "no rule matched" or a
/// malformed substitution; those are normal outcomes.
#[derive(Error, Debug)]
pub enum ForwarderError {
    /// Rule rejected at creation/update time, never persisted
    #[error("Invalid forwarding rule: {0}")]
    Validation(String),

    /// No stored rule carries the requested id
    #[error("Forwarding rule not found: {0}")]
    RuleNotFound(RuleId),

    /// Blob store read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    Settings(String),
}

/// Result type alias using ForwarderError.
pub type ForwarderResult<T> = Result<T, ForwarderError>;
