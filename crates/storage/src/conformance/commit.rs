use std::future::Future;

use lure_core::{EventKind, Status};

use super::{make_event, make_new_result, seed_result, TestResult};
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "event_and_save_commit_together",
        event_and_save_commit_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "failed_commit_applies_nothing",
        failed_commit_applies_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "duplicate_rid_detected_at_commit",
        duplicate_rid_detected_at_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "insert_and_event_in_one_snapshot",
        insert_and_event_in_one_snapshot(factory).await,
    ));

    results
}

/// A status save and its event append become visible together.
async fn event_and_save_commit_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut rec = s
        .get_result_for_update(&mut snap, "aaaaaaa")
        .await
        .map_err(|e| e.to_string())?;
    s.append_event(&mut snap, make_event("aaaaaaa", 1, EventKind::Sent))
        .await
        .map_err(|e| e.to_string())?;
    rec.status = Status::Sent;
    s.save_result(&mut snap, &rec)
        .await
        .map_err(|e| e.to_string())?;

    if !s
        .list_result_events("aaaaaaa")
        .await
        .map_err(|e| e.to_string())?
        .is_empty()
    {
        return Err("event visible before commit".to_string());
    }

    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    let events = s
        .list_result_events("aaaaaaa")
        .await
        .map_err(|e| e.to_string())?;
    if rec.status != Status::Sent || rec.version != 1 {
        return Err(format!(
            "expected Sent v1, got {} v{}",
            rec.status, rec.version
        ));
    }
    if events.len() != 1 || events[0].kind != EventKind::Sent {
        return Err(format!("expected one Sent event, got {events:?}"));
    }
    Ok(())
}

/// A commit that fails validation applies none of the snapshot's writes.
async fn failed_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;

    // Snapshot A stages an insert of a fresh rid plus an event, then
    // loses a duplicate-id race on a second insert.
    let mut a = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_result(&mut a, make_new_result("bbbbbbb", 1))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_result(&mut a, make_new_result("ccccccc", 1))
        .await
        .map_err(|e| e.to_string())?;
    s.append_event(&mut a, make_event("aaaaaaa", 1, EventKind::Opened))
        .await
        .map_err(|e| e.to_string())?;

    seed_result(&s, "ccccccc", 1).await?;

    match s.commit_snapshot(a).await {
        Err(StorageError::DuplicateResultId { .. }) => {}
        Err(e) => return Err(format!("expected DuplicateResultId, got {e}")),
        Ok(()) => return Err("commit with duplicate rid succeeded".to_string()),
    }

    if s.result_exists("bbbbbbb").await.map_err(|e| e.to_string())? {
        return Err("partial commit: bbbbbbb inserted".to_string());
    }
    let events = s.list_events(1).await.map_err(|e| e.to_string())?;
    if !events.is_empty() {
        return Err("partial commit: event appended".to_string());
    }
    Ok(())
}

/// Two snapshots insert the same rid; the second commit is rejected even
/// though neither insert saw the other.
async fn duplicate_rid_detected_at_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut a = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut b = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_result(&mut a, make_new_result("aaaaaaa", 1))
        .await
        .map_err(|e| format!("insert a: {e}"))?;
    s.insert_result(&mut b, make_new_result("aaaaaaa", 2))
        .await
        .map_err(|e| format!("insert b: {e}"))?;
    s.commit_snapshot(a)
        .await
        .map_err(|e| format!("commit a: {e}"))?;
    match s.commit_snapshot(b).await {
        Err(StorageError::DuplicateResultId { rid }) if rid == "aaaaaaa" => {}
        Err(e) => return Err(format!("expected DuplicateResultId, got {e}")),
        Ok(()) => return Err("second insert of same rid committed".to_string()),
    }
    let rec = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if rec.campaign_id != 1 {
        return Err(format!("winner overwritten: campaign {}", rec.campaign_id));
    }
    Ok(())
}

async fn insert_and_event_in_one_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_result(&mut snap, make_new_result("aaaaaaa", 1))
        .await
        .map_err(|e| e.to_string())?;
    s.append_event(&mut snap, make_event("aaaaaaa", 1, EventKind::Sent))
        .await
        .map_err(|e| format!("append for result inserted in same snapshot: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let events = s.list_events(1).await.map_err(|e| e.to_string())?;
    if events.len() != 1 {
        return Err(format!("expected 1 event, got {}", events.len()));
    }
    Ok(())
}
