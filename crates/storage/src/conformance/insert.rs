use std::future::Future;

use lure_core::Status;

use super::{make_new_result, seed_result, TestResult};
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "insert",
        "insert_creates_result_at_version_0",
        insert_creates_result_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_sets_initial_fields",
        insert_sets_initial_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_assigns_distinct_internal_ids",
        insert_assigns_distinct_internal_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "duplicate_rid_in_same_snapshot_rejected",
        duplicate_rid_in_same_snapshot_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "duplicate_rid_across_snapshots_rejected",
        duplicate_rid_across_snapshots_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "result_exists_reflects_commits",
        result_exists_reflects_commits(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "list_results_filters_by_campaign",
        list_results_filters_by_campaign(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// After insert + commit, the result version must be 0.
async fn insert_creates_result_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    let rec = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("expected version 0, got {}", rec.version));
    }
    Ok(())
}

/// Inserted results start unreported, without IP or coordinates.
async fn insert_sets_initial_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 4).await?;
    let rec = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if rec.status != Status::Scheduled {
        return Err(format!("expected Scheduled, got {}", rec.status));
    }
    if rec.reported {
        return Err("new result must not be reported".to_string());
    }
    if !rec.ip.is_empty() || rec.latitude != 0.0 || rec.longitude != 0.0 {
        return Err("new result must have no location".to_string());
    }
    if rec.campaign_id != 4 || rec.recipient.email != "aaaaaaa@example.com" {
        return Err(format!("unexpected identity fields: {rec:?}"));
    }
    Ok(())
}

/// Internal ids are assigned by the backend and never repeat.
async fn insert_assigns_distinct_internal_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let a = s
        .insert_result(&mut snap, make_new_result("aaaaaaa", 1))
        .await
        .map_err(|e| e.to_string())?;
    let b = s
        .insert_result(&mut snap, make_new_result("bbbbbbb", 1))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    if a.id == b.id {
        return Err(format!("both results got internal id {}", a.id));
    }
    Ok(())
}

async fn duplicate_rid_in_same_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    match s
        .insert_result(&mut snap, make_new_result("aaaaaaa", 2))
        .await
    {
        Err(StorageError::DuplicateResultId { rid }) if rid == "aaaaaaa" => Ok(()),
        Err(e) => Err(format!("expected DuplicateResultId, got {e}")),
        Ok(_) => Err("duplicate insert succeeded".to_string()),
    }
}

async fn duplicate_rid_across_snapshots_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    match s
        .insert_result(&mut snap, make_new_result("aaaaaaa", 1))
        .await
    {
        Err(StorageError::DuplicateResultId { .. }) => Ok(()),
        Err(e) => Err(format!("expected DuplicateResultId, got {e}")),
        Ok(_) => Err("duplicate insert succeeded".to_string()),
    }
}

async fn result_exists_reflects_commits<S, F, Fut>(factory: &F) -> Result<(), String>
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
    if s.result_exists("aaaaaaa").await.map_err(|e| e.to_string())? {
        return Err("uncommitted result reported as existing".to_string());
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    if !s.result_exists("aaaaaaa").await.map_err(|e| e.to_string())? {
        return Err("committed result reported as missing".to_string());
    }
    Ok(())
}

async fn list_results_filters_by_campaign<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    seed_result(&s, "bbbbbbb", 2).await?;
    seed_result(&s, "ccccccc", 1).await?;
    let listed = s.list_results(1).await.map_err(|e| e.to_string())?;
    let rids: Vec<&str> = listed.iter().map(|r| r.rid.as_str()).collect();
    if rids != ["aaaaaaa", "ccccccc"] {
        return Err(format!("expected [aaaaaaa, ccccccc], got {rids:?}"));
    }
    Ok(())
}
