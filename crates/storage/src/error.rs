/// All errors that can be returned by a TrackingStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No result with the given public identifier.
    #[error("result not found: {rid}")]
    ResultNotFound { rid: String },

    /// Uniqueness constraint on the public identifier violated. Raised by
    /// `insert_result` or, for races between snapshots, by `commit_snapshot`.
    #[error("duplicate result id: {rid}")]
    DuplicateResultId { rid: String },

    /// Optimistic concurrency control conflict -- the result was modified
    /// since it was read. The expected version was not found.
    #[error("concurrent conflict on result {rid}: expected version {expected_version}")]
    ConcurrentConflict { rid: String, expected_version: i64 },

    /// A persisted dump has a schema version this build cannot load.
    #[error(
        "unsupported schema version {found} (expected {expected}); run `lure migrate` on the data file"
    )]
    UnsupportedSchema { found: u32, expected: u32 },

    /// A backend-specific storage error (I/O, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
