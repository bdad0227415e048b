use thiserror::Error;

/// Errors produced by type parsing and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,

    #[error("invalid sequence key {key:?}: {reason}")]
    InvalidSequenceKey { key: String, reason: String },

    #[error("invalid decimal amount: {0}")]
    InvalidAmount(String),
}
