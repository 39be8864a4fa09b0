use std::future::Future;

use lure_core::EventKind;

use super::{make_event, make_new_result, TestResult};
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_result_nonexistent",
        get_result_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_result_for_update_nonexistent",
        get_result_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "save_result_nonexistent",
        save_result_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "append_event_for_unknown_result",
        append_event_for_unknown_result(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "queries_empty_for_unknown_campaign",
        queries_empty_for_unknown_campaign(factory).await,
    ));

    results
}

async fn get_result_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_result("missing").await {
        Err(StorageError::ResultNotFound { rid }) if rid == "missing" => Ok(()),
        Err(e) => Err(format!("expected ResultNotFound {{ rid: missing }}, got {e}")),
        Ok(_) => Err("nonexistent result returned".to_string()),
    }
}

async fn get_result_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let outcome = s.get_result_for_update(&mut snap, "missing").await;
    let _ = s.abort_snapshot(snap).await;
    match outcome {
        Err(StorageError::ResultNotFound { rid }) if rid == "missing" => Ok(()),
        Err(e) => Err(format!("expected ResultNotFound, got {e}")),
        Ok(_) => Err("nonexistent result locked".to_string()),
    }
}

async fn save_result_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    // Build a record by inserting and aborting, so it never lands.
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let ghost = s
        .insert_result(&mut snap, make_new_result("ghostly", 1))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let outcome = s.save_result(&mut snap, &ghost).await;
    let _ = s.abort_snapshot(snap).await;
    match outcome {
        Err(StorageError::ResultNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected ResultNotFound, got {e}")),
        Ok(_) => Err("save of nonexistent result succeeded".to_string()),
    }
}

/// Every event must reference an existing result.
async fn append_event_for_unknown_result<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let outcome = s
        .append_event(&mut snap, make_event("missing", 1, EventKind::Opened))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match outcome {
        Err(StorageError::ResultNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected ResultNotFound, got {e}")),
        Ok(()) => Err("orphan event accepted".to_string()),
    }
}

async fn queries_empty_for_unknown_campaign<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let results = s.list_results(99).await.map_err(|e| e.to_string())?;
    let events = s.list_events(99).await.map_err(|e| e.to_string())?;
    let own = s
        .list_result_events("missing")
        .await
        .map_err(|e| e.to_string())?;
    if !results.is_empty() || !events.is_empty() || !own.is_empty() {
        return Err("expected empty query results".to_string());
    }
    if s.result_exists("missing").await.map_err(|e| e.to_string())? {
        return Err("result_exists true for unknown rid".to_string());
    }
    Ok(())
}
