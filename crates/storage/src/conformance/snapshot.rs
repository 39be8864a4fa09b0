use std::future::Future;

use lure_core::{EventKind, Status};

use super::{make_event, make_new_result, seed_result, TestResult};
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_insert_invisible",
        uncommitted_insert_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_insert_discarded",
        aborted_insert_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_rolls_back",
        dropped_snapshot_rolls_back(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_save_invisible",
        uncommitted_save_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_own_writes",
        snapshot_reads_own_writes(factory).await,
    ));

    results
}

async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    match s.get_result("aaaaaaa").await {
        Err(StorageError::ResultNotFound { .. }) => {}
        Err(e) => return Err(format!("expected ResultNotFound, got {e}")),
        Ok(_) => return Err("uncommitted insert visible outside snapshot".to_string()),
    }
    let listed = s.list_results(1).await.map_err(|e| e.to_string())?;
    if !listed.is_empty() {
        return Err(format!("expected no listed results, got {}", listed.len()));
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())
}

async fn aborted_insert_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    if s.result_exists("aaaaaaa").await.map_err(|e| e.to_string())? {
        return Err("aborted insert is visible".to_string());
    }
    let events = s.list_events(1).await.map_err(|e| e.to_string())?;
    if !events.is_empty() {
        return Err(format!("aborted events visible: {}", events.len()));
    }
    Ok(())
}

async fn dropped_snapshot_rolls_back<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let mut rec = s
            .get_result_for_update(&mut snap, "aaaaaaa")
            .await
            .map_err(|e| e.to_string())?;
        rec.status = Status::Sent;
        s.save_result(&mut snap, &rec)
            .await
            .map_err(|e| e.to_string())?;
        s.append_event(&mut snap, make_event("aaaaaaa", 1, EventKind::Sent))
            .await
            .map_err(|e| e.to_string())?;
        // snapshot dropped here without commit
    }
    let rec = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if rec.status != Status::Scheduled || rec.version != 0 {
        return Err(format!(
            "dropped snapshot leaked: status {} version {}",
            rec.status, rec.version
        ));
    }
    let events = s.list_events(1).await.map_err(|e| e.to_string())?;
    if !events.is_empty() {
        return Err("dropped snapshot leaked events".to_string());
    }
    Ok(())
}

async fn uncommitted_save_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    rec.status = Status::Opened;
    s.save_result(&mut snap, &rec)
        .await
        .map_err(|e| e.to_string())?;

    let outside = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if outside.status != Status::Scheduled {
        return Err(format!(
            "uncommitted save visible outside snapshot: {}",
            outside.status
        ));
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let after = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if after.status != Status::Opened {
        return Err(format!("committed save not visible: {}", after.status));
    }
    Ok(())
}

async fn snapshot_reads_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut rec = s
        .get_result_for_update(&mut snap, "aaaaaaa")
        .await
        .map_err(|e| format!("read own insert: {e}"))?;
    rec.status = Status::Sent;
    let v = s
        .save_result(&mut snap, &rec)
        .await
        .map_err(|e| e.to_string())?;
    let reread = s
        .get_result_for_update(&mut snap, "aaaaaaa")
        .await
        .map_err(|e| e.to_string())?;
    if reread.status != Status::Sent || reread.version != v {
        return Err(format!(
            "expected own save (Sent, v{v}), got ({}, v{})",
            reread.status, reread.version
        ));
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())
}
