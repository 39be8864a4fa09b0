use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{EventRecord, NewEvent, NewResult, ResultRecord};

/// The storage trait for Lure tracking backends.
///
/// A `TrackingStorage` implementation provides durable, transactional
/// storage for results and the event log.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` — start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` — commit and consume the transaction
///    OR `abort_snapshot(snapshot)` — roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back. An event appended in a snapshot and a result saved in
/// the same snapshot become visible together or not at all.
///
/// ## Per-result serialization
///
/// `get_result_for_update` locks the result until the snapshot is committed
/// or aborted, so read-modify-write sequences on one result run one at a
/// time. `save_result` is additionally version-checked:
/// `UPDATE WHERE version = expected_version`, returning
/// `Err(StorageError::ConcurrentConflict { ... })` on mismatch.
///
/// ## Identifier uniqueness
///
/// `rid` is unique across all results. The constraint is enforced by the
/// backend (at insert and again at commit), not only by callers checking
/// `result_exists` first.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait TrackingStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Result operations (within snapshot) ──────────────────────────────────

    /// Insert a new result at version 0.
    ///
    /// Returns `Err(StorageError::DuplicateResultId)` if the `rid` is taken.
    async fn insert_result(
        &self,
        snapshot: &mut Self::Snapshot,
        result: NewResult,
    ) -> Result<ResultRecord, StorageError>;

    /// Read a result by public identifier, locking it for update.
    ///
    /// Returns `Err(StorageError::ResultNotFound)` if the result does not exist.
    async fn get_result_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        rid: &str,
    ) -> Result<ResultRecord, StorageError>;

    /// Save a modified result (atomic upsert of the mutable fields).
    ///
    /// `result.version` must equal the stored version; returns the new
    /// version on success.
    async fn save_result(
        &self,
        snapshot: &mut Self::Snapshot,
        result: &ResultRecord,
    ) -> Result<i64, StorageError>;

    /// Append an event to the log.
    ///
    /// The owning result (`event.rid`) must exist, either committed or
    /// inserted in this snapshot.
    async fn append_event(
        &self,
        snapshot: &mut Self::Snapshot,
        event: NewEvent,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot) ───────────────────────────────────

    /// Read a result without locking.
    async fn get_result(&self, rid: &str) -> Result<ResultRecord, StorageError>;

    /// Whether a committed result uses this identifier.
    async fn result_exists(&self, rid: &str) -> Result<bool, StorageError>;

    /// All results of a campaign, in insertion order.
    async fn list_results(&self, campaign_id: i64) -> Result<Vec<ResultRecord>, StorageError>;

    /// All events of a campaign, in append order.
    async fn list_events(&self, campaign_id: i64) -> Result<Vec<EventRecord>, StorageError>;

    /// All events of one result, in append order.
    async fn list_result_events(&self, rid: &str) -> Result<Vec<EventRecord>, StorageError>;
}
