use lure_core::RidError;
use lure_storage::StorageError;

/// Errors returned by [`ResultTracker`](crate::ResultTracker) operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Event details could not be serialized. Raised before any storage
    /// call, so nothing was written.
    #[error("failed to serialize event details: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage backend failed; the snapshot was rolled back.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The secure random source failed while allocating an identifier.
    #[error(transparent)]
    RandomSource(#[from] RidError),
}

impl TrackerError {
    /// True if the operation targeted a result that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TrackerError::Storage(StorageError::ResultNotFound { .. })
        )
    }
}
