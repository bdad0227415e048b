use crate::item::ItemKey;

/// Errors from ledger store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A conditional single-item write found the item in the wrong state.
    #[error("condition failed for {0}")]
    ConditionFailed(ItemKey),

    /// A transaction was cancelled because one of its conditions failed.
    /// Nothing in the transaction was applied.
    #[error("transaction cancelled: condition failed on operation {index} ({key})")]
    TransactionCanceled { index: usize, key: ItemKey },

    /// The transaction request itself is malformed.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The backend could not be reached or failed to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An item exists but does not have the expected shape.
    #[error("corrupt item {key}: {reason}")]
    CorruptItem { key: ItemKey, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// `true` when the failure came from a write condition, i.e. another
    /// writer got there first. These are the errors worth re-running the
    /// whole read-validate-write cycle for.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConditionFailed(_) | Self::TransactionCanceled { .. }
        )
    }

    pub fn corrupt(key: &ItemKey, reason: impl Into<String>) -> Self {
        Self::CorruptItem {
            key: key.clone(),
            reason: reason.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_classification() {
        let key = ItemKey::new("USER#a", "HEAD");
        assert!(StoreError::ConditionFailed(key.clone()).is_conflict());
        assert!(StoreError::TransactionCanceled { index: 2, key: key.clone() }.is_conflict());
        assert!(!StoreError::Unavailable("timeout".into()).is_conflict());
        assert!(!StoreError::corrupt(&key, "missing Version").is_conflict());
    }

    #[test]
    fn display_includes_key() {
        let key = ItemKey::new("USER#a", "HEAD");
        let text = StoreError::TransactionCanceled { index: 2, key }.to_string();
        assert!(text.contains("operation 2"));
        assert!(text.contains("USER#a/HEAD"));
    }
}
