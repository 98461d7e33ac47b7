//! Top-level error type shared across crates.

use thiserror::Error;

/// Common error type for the weave protocol.
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid proof of work")]
    InvalidWork,

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}
