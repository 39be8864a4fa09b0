//! In-memory `TrackingStorage` backend.
//!
//! Committed tables live behind a single mutex; a snapshot buffers its
//! inserts, saves and event appends and applies them in one critical
//! section at commit. Per-result row locks (`tokio::sync::Mutex`) give
//! `get_result_for_update` its `SELECT ... FOR UPDATE` semantics: the lock
//! is owned by the snapshot and released when it is committed, aborted or
//! dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::dump::{StoreDump, SCHEMA_VERSION};
use crate::error::StorageError;
use crate::record::{EventRecord, NewEvent, NewResult, ResultRecord};
use crate::traits::TrackingStorage;

type RowLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
struct Tables {
    results: Vec<ResultRecord>,
    by_rid: HashMap<String, usize>,
    events: Vec<EventRecord>,
}

impl Tables {
    fn result(&self, rid: &str) -> Option<&ResultRecord> {
        self.by_rid.get(rid).map(|&i| &self.results[i])
    }
}

/// A save staged in a snapshot, with the committed version it was based on.
struct StagedSave {
    base_version: i64,
    record: ResultRecord,
}

/// In-progress transaction for [`MemoryStorage`].
pub struct MemorySnapshot {
    locks: HashMap<String, OwnedMutexGuard<()>>,
    inserted: Vec<ResultRecord>,
    saved: HashMap<String, StagedSave>,
    events: Vec<NewEvent>,
}

impl MemorySnapshot {
    fn staged(&self, rid: &str) -> Option<&ResultRecord> {
        if let Some(staged) = self.saved.get(rid) {
            return Some(&staged.record);
        }
        self.inserted.iter().find(|r| r.rid == rid)
    }
}

/// Transactional in-memory storage.
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<String, RowLock>>,
    next_result_id: AtomicI64,
    next_event_id: AtomicI64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("next_result_id", &self.next_result_id.load(Ordering::Relaxed))
            .field("next_event_id", &self.next_event_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            row_locks: Mutex::new(HashMap::new()),
            next_result_id: AtomicI64::new(1),
            next_event_id: AtomicI64::new(1),
        }
    }

    /// Rebuild a store from a persisted dump.
    pub fn from_dump(dump: StoreDump) -> Result<Self, StorageError> {
        if dump.schema_version != SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchema {
                found: dump.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        let mut tables = Tables::default();
        for result in dump.results {
            if tables.by_rid.contains_key(&result.rid) {
                return Err(StorageError::DuplicateResultId { rid: result.rid });
            }
            tables.by_rid.insert(result.rid.clone(), tables.results.len());
            tables.results.push(result);
        }
        tables.events = dump.events;

        let next_result_id = tables.results.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let next_event_id = tables.events.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        Ok(Self {
            tables: Mutex::new(tables),
            row_locks: Mutex::new(HashMap::new()),
            next_result_id: AtomicI64::new(next_result_id),
            next_event_id: AtomicI64::new(next_event_id),
        })
    }

    /// Copy the committed tables into a dump.
    pub fn dump(&self) -> Result<StoreDump, StorageError> {
        let tables = self.tables()?;
        Ok(StoreDump {
            schema_version: SCHEMA_VERSION,
            results: tables.results.clone(),
            events: tables.events.clone(),
        })
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("result table lock poisoned".to_string()))
    }

    fn row_lock(&self, rid: &str) -> Result<RowLock, StorageError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StorageError::Backend("row lock table poisoned".to_string()))?;
        Ok(locks.entry(rid.to_string()).or_default().clone())
    }

    /// The result as seen from inside `snapshot`: staged changes first, then
    /// committed state.
    fn visible(
        &self,
        snapshot: &MemorySnapshot,
        rid: &str,
    ) -> Result<Option<ResultRecord>, StorageError> {
        if let Some(record) = snapshot.staged(rid) {
            return Ok(Some(record.clone()));
        }
        Ok(self.tables()?.result(rid).cloned())
    }
}

fn conflict(result: &ResultRecord) -> StorageError {
    StorageError::ConcurrentConflict {
        rid: result.rid.clone(),
        expected_version: result.version,
    }
}

fn not_found(rid: &str) -> StorageError {
    StorageError::ResultNotFound {
        rid: rid.to_string(),
    }
}

#[async_trait]
impl TrackingStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot {
            locks: HashMap::new(),
            inserted: Vec::new(),
            saved: HashMap::new(),
            events: Vec::new(),
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut tables = self.tables()?;

        // Validate everything before applying anything.
        for result in &snapshot.inserted {
            if tables.by_rid.contains_key(&result.rid) {
                return Err(StorageError::DuplicateResultId {
                    rid: result.rid.clone(),
                });
            }
        }
        for (rid, staged) in &snapshot.saved {
            let current = tables.result(rid).ok_or_else(|| not_found(rid))?;
            if current.version != staged.base_version {
                return Err(StorageError::ConcurrentConflict {
                    rid: rid.clone(),
                    expected_version: staged.base_version,
                });
            }
        }

        let MemorySnapshot {
            locks,
            inserted,
            saved,
            events,
        } = snapshot;

        for result in inserted {
            let index = tables.results.len();
            tables.by_rid.insert(result.rid.clone(), index);
            tables.results.push(result);
        }
        for (rid, staged) in saved {
            if let Some(&index) = tables.by_rid.get(&rid) {
                tables.results[index] = staged.record;
            }
        }
        for event in events {
            let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
            tables.events.push(event.into_record(id));
        }

        drop(tables);
        drop(locks);
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_result(
        &self,
        snapshot: &mut MemorySnapshot,
        result: NewResult,
    ) -> Result<ResultRecord, StorageError> {
        if self.visible(snapshot, &result.rid)?.is_some() {
            return Err(StorageError::DuplicateResultId { rid: result.rid });
        }
        let record = ResultRecord {
            id: self.next_result_id.fetch_add(1, Ordering::SeqCst),
            campaign_id: result.campaign_id,
            rid: result.rid,
            recipient: result.recipient,
            status: result.status,
            reported: false,
            ip: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            send_date: result.send_date,
            modified_date: result.modified_date,
            version: 0,
        };
        snapshot.inserted.push(record.clone());
        Ok(record)
    }

    async fn get_result_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        rid: &str,
    ) -> Result<ResultRecord, StorageError> {
        if !snapshot.locks.contains_key(rid) {
            if self.visible(snapshot, rid)?.is_none() {
                return Err(not_found(rid));
            }
            let guard = self.row_lock(rid)?.lock_owned().await;
            snapshot.locks.insert(rid.to_string(), guard);
        }
        // Re-read after acquiring the lock: the previous holder may have
        // committed a newer version.
        self.visible(snapshot, rid)?.ok_or_else(|| not_found(rid))
    }

    async fn save_result(
        &self,
        snapshot: &mut MemorySnapshot,
        result: &ResultRecord,
    ) -> Result<i64, StorageError> {
        if let Some(pos) = snapshot.inserted.iter().position(|r| r.rid == result.rid) {
            let current = &snapshot.inserted[pos];
            if current.version != result.version {
                return Err(conflict(result));
            }
            let mut next = result.clone();
            next.id = current.id;
            next.version = result.version + 1;
            snapshot.inserted[pos] = next;
            return Ok(result.version + 1);
        }

        if let Some(staged) = snapshot.saved.get_mut(&result.rid) {
            if staged.record.version != result.version {
                return Err(conflict(result));
            }
            let mut next = result.clone();
            next.id = staged.record.id;
            next.version = result.version + 1;
            staged.record = next;
            return Ok(result.version + 1);
        }

        let committed = self
            .tables()?
            .result(&result.rid)
            .cloned()
            .ok_or_else(|| not_found(&result.rid))?;
        if committed.version != result.version {
            return Err(conflict(result));
        }
        let mut next = result.clone();
        next.id = committed.id;
        next.version = committed.version + 1;
        snapshot.saved.insert(
            result.rid.clone(),
            StagedSave {
                base_version: committed.version,
                record: next,
            },
        );
        Ok(committed.version + 1)
    }

    async fn append_event(
        &self,
        snapshot: &mut MemorySnapshot,
        event: NewEvent,
    ) -> Result<(), StorageError> {
        if self.visible(snapshot, &event.rid)?.is_none() {
            return Err(not_found(&event.rid));
        }
        snapshot.events.push(event);
        Ok(())
    }

    async fn get_result(&self, rid: &str) -> Result<ResultRecord, StorageError> {
        self.tables()?
            .result(rid)
            .cloned()
            .ok_or_else(|| not_found(rid))
    }

    async fn result_exists(&self, rid: &str) -> Result<bool, StorageError> {
        Ok(self.tables()?.by_rid.contains_key(rid))
    }

    async fn list_results(&self, campaign_id: i64) -> Result<Vec<ResultRecord>, StorageError> {
        Ok(self
            .tables()?
            .results
            .iter()
            .filter(|r| r.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn list_events(&self, campaign_id: i64) -> Result<Vec<EventRecord>, StorageError> {
        Ok(self
            .tables()?
            .events
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn list_result_events(&self, rid: &str) -> Result<Vec<EventRecord>, StorageError> {
        Ok(self
            .tables()?
            .events
            .iter()
            .filter(|e| e.rid == rid)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use lure_core::{EventKind, Status};
    use time::macros::datetime;

    use super::*;
    use crate::record::Recipient;

    #[test]
    fn debug_shows_id_counters() {
        let storage = MemoryStorage::new();
        let text = format!("{storage:?}");
        assert!(text.starts_with("MemoryStorage {"), "{text}");
        assert!(text.contains("next_result_id: 1"), "{text}");
    }

    fn new_result(rid: &str) -> NewResult {
        NewResult {
            campaign_id: 7,
            rid: rid.to_string(),
            recipient: Recipient::new("alice@example.com"),
            status: Status::Scheduled,
            send_date: datetime!(2025-01-01 0:00 UTC),
            modified_date: datetime!(2025-01-01 0:00 UTC),
        }
    }

    fn event(rid: &str, kind: EventKind) -> NewEvent {
        NewEvent {
            campaign_id: 7,
            rid: rid.to_string(),
            email: "alice@example.com".to_string(),
            time: datetime!(2025-01-01 0:05 UTC),
            kind,
            details: None,
            is_screened: false,
        }
    }

    #[tokio::test]
    async fn ids_are_sequential_and_events_numbered_in_order() {
        let s = MemoryStorage::new();
        let mut snap = s.begin_snapshot().await.unwrap();
        let a = s.insert_result(&mut snap, new_result("aaaaaaa")).await.unwrap();
        let b = s.insert_result(&mut snap, new_result("bbbbbbb")).await.unwrap();
        s.append_event(&mut snap, event("aaaaaaa", EventKind::Sent))
            .await
            .unwrap();
        s.append_event(&mut snap, event("bbbbbbb", EventKind::Sent))
            .await
            .unwrap();
        s.commit_snapshot(snap).await.unwrap();

        assert_eq!(b.id, a.id + 1);
        let events = s.list_events(7).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].id < events[1].id);
        assert_eq!(events[0].rid, "aaaaaaa");
    }

    #[tokio::test]
    async fn dump_round_trips_and_continues_numbering() {
        let s = MemoryStorage::new();
        let mut snap = s.begin_snapshot().await.unwrap();
        s.insert_result(&mut snap, new_result("aaaaaaa")).await.unwrap();
        s.append_event(&mut snap, event("aaaaaaa", EventKind::Sent))
            .await
            .unwrap();
        s.commit_snapshot(snap).await.unwrap();

        let restored = MemoryStorage::from_dump(s.dump().unwrap()).unwrap();
        assert_eq!(
            restored.get_result("aaaaaaa").await.unwrap(),
            s.get_result("aaaaaaa").await.unwrap()
        );

        let mut snap = restored.begin_snapshot().await.unwrap();
        let next = restored
            .insert_result(&mut snap, new_result("ccccccc"))
            .await
            .unwrap();
        restored.commit_snapshot(snap).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn old_schema_dump_is_rejected() {
        let dump = StoreDump {
            schema_version: 1,
            results: Vec::new(),
            events: Vec::new(),
        };
        assert!(matches!(
            MemoryStorage::from_dump(dump),
            Err(StorageError::UnsupportedSchema {
                found: 1,
                expected: 2
            })
        ));
    }

    #[tokio::test]
    async fn dropped_snapshot_releases_row_lock() {
        let s = MemoryStorage::new();
        let mut snap = s.begin_snapshot().await.unwrap();
        s.insert_result(&mut snap, new_result("aaaaaaa")).await.unwrap();
        s.commit_snapshot(snap).await.unwrap();

        {
            let mut held = s.begin_snapshot().await.unwrap();
            s.get_result_for_update(&mut held, "aaaaaaa").await.unwrap();
        }

        let mut snap = s.begin_snapshot().await.unwrap();
        let locked = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            s.get_result_for_update(&mut snap, "aaaaaaa"),
        )
        .await;
        assert!(locked.is_ok(), "row lock was not released on drop");
    }
}
