use std::fmt;

use eco_store::StoreError;
use eco_types::{Points, TypeError};
use serde::Serialize;

/// Errors produced by ledger operations.
///
/// Messages are safe to show to end users: store failures are logged with
/// their detail and surfaced only as the operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("{actor} is not allowed to {action}")]
    Unauthorized { actor: String, action: &'static str },

    #[error("voucher not found: {voucher_id}")]
    VoucherNotFound { voucher_id: String },

    #[error("not enough points: {required} required, {available} available")]
    InsufficientPoints { required: Points, available: Points },

    #[error("{operation} conflicted with a concurrent write")]
    TransactionConflict { operation: &'static str },

    #[error("ledger store unavailable during {operation}")]
    StoreUnavailable { operation: &'static str },
}

impl LedgerError {
    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            reason: reason.into(),
        }
    }

    /// Classify a store failure. The store's own message is logged here and
    /// goes no further.
    pub fn from_store(operation: &'static str, error: StoreError) -> Self {
        if error.is_conflict() {
            tracing::debug!(operation, %error, "store write condition failed");
            Self::TransactionConflict { operation }
        } else {
            tracing::warn!(operation, %error, "store call failed");
            Self::StoreUnavailable { operation }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::VoucherNotFound { .. } => ErrorKind::VoucherNotFound,
            Self::InsufficientPoints { .. } => ErrorKind::InsufficientPoints,
            Self::TransactionConflict { .. } => ErrorKind::TransactionConflict,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
        }
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Malformed identifiers and keys are rejected input, reported the same way
/// as bad amounts.
impl From<TypeError> for LedgerError {
    fn from(error: TypeError) -> Self {
        Self::invalid_amount(error.to_string())
    }
}

/// Stable machine-readable error kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidAmount,
    Unauthorized,
    VoucherNotFound,
    InsufficientPoints,
    TransactionConflict,
    StoreUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::VoucherNotFound => "VOUCHER_NOT_FOUND",
            Self::InsufficientPoints => "INSUFFICIENT_POINTS",
            Self::TransactionConflict => "TRANSACTION_CONFLICT",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }

    /// Store-layer failures are retryable: every mutation is atomic, so
    /// either nothing happened or everything did.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict | Self::StoreUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

pub type LedgerResult<T> = Result<T, LedgerError>;
