// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::error::{ErrorKind, InvokeError};

/// Storage provider errors.
///
/// Version numbers follow the persistence contract: 0 means "absent", the
/// first successful write produces 1, and each accepted update increments
/// the version by exactly one.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A conditional write observed a different stored version.
    #[error("Concurrency conflict: expected version {expected}, stored version {actual}")]
    Concurrency {
        /// Version the writer expected (0 = expected absent).
        expected: u64,
        /// Version actually stored (0 = absent).
        actual: u64,
    },

    /// The record exists but cannot be interpreted.
    #[error("Store corrupted: {0}")]
    Corrupted(String),

    /// The provider is unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether this is an optimistic-concurrency conflict.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }
}

impl From<StorageError> for InvokeError {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            StorageError::Concurrency { .. } => ErrorKind::ConcurrencyConflict,
            StorageError::Corrupted(_) => ErrorKind::StoreCorrupted,
            StorageError::Unavailable(_) => ErrorKind::Unreachable,
        };
        InvokeError::new(kind, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_display() {
        let err = StorageError::Concurrency {
            expected: 7,
            actual: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('8'));
        assert!(err.is_concurrency());
    }

    #[test]
    fn test_conversion_to_invoke_error() {
        let err: InvokeError = StorageError::Concurrency {
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);

        let err: InvokeError = StorageError::Corrupted("bad header".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::StoreCorrupted);
    }
}
