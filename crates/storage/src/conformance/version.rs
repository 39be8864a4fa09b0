use std::future::Future;

use lure_core::Status;

use super::{seed_result, TestResult};
use crate::{StorageError, TrackingStorage};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    // Basic version tracking
    results.push(TestResult::from_result(
        "version",
        "save_increments_version",
        save_increments_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "versions_increment_sequentially",
        versions_increment_sequentially(factory).await,
    ));

    // Stale versions rejected
    results.push(TestResult::from_result(
        "version",
        "stale_save_rejected",
        stale_save_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_save_has_correct_fields",
        stale_save_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "unlocked_race_detected_at_commit",
        unlocked_race_detected_at_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "save_preserves_internal_id",
        save_preserves_internal_id(factory).await,
    ));

    results
}

async fn save_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
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
    rec.status = Status::Sent;
    let v = s
        .save_result(&mut snap, &rec)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    if v != 1 {
        return Err(format!("save returned version {v}, expected 1"));
    }
    let stored = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if stored.version != 1 {
        return Err(format!("stored version {}, expected 1", stored.version));
    }
    Ok(())
}

async fn versions_increment_sequentially<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    for (expected, status) in [(1, Status::Sent), (2, Status::Opened), (3, Status::Clicked)] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let mut rec = s
            .get_result_for_update(&mut snap, "aaaaaaa")
            .await
            .map_err(|e| e.to_string())?;
        rec.status = status;
        let v = s
            .save_result(&mut snap, &rec)
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
        if v != expected {
            return Err(format!("expected version {expected}, got {v}"));
        }
    }
    Ok(())
}

/// A record read before another writer committed cannot be saved.
async fn stale_save_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    let stale = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut fresh = s
        .get_result_for_update(&mut snap, "aaaaaaa")
        .await
        .map_err(|e| e.to_string())?;
    fresh.status = Status::Sent;
    s.save_result(&mut snap, &fresh)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut stale = stale;
    stale.status = Status::Error;
    let outcome = s.save_result(&mut snap, &stale).await;
    let _ = s.abort_snapshot(snap).await;
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        Err(e) => return Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(v) => return Err(format!("stale save succeeded with version {v}")),
    }
    let stored = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if stored.status != Status::Sent {
        return Err(format!("stale save clobbered status: {}", stored.status));
    }
    Ok(())
}

async fn stale_save_has_correct_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    let mut stale = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    stale.version = 5;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let outcome = s.save_result(&mut snap, &stale).await;
    let _ = s.abort_snapshot(snap).await;
    match outcome {
        Err(StorageError::ConcurrentConflict {
            rid,
            expected_version,
        }) => {
            if rid != "aaaaaaa" || expected_version != 5 {
                return Err(format!(
                    "wrong conflict fields: rid={rid} expected_version={expected_version}"
                ));
            }
            Ok(())
        }
        Err(e) => Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(v) => Err(format!("save with wrong version succeeded: {v}")),
    }
}

/// Two snapshots save the same result without taking the row lock; the
/// second commit must fail rather than overwrite the first.
async fn unlocked_race_detected_at_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    let base = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;

    let mut a = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut b = s.begin_snapshot().await.map_err(|e| e.to_string())?;

    let mut rec_a = base.clone();
    rec_a.status = Status::Opened;
    s.save_result(&mut a, &rec_a)
        .await
        .map_err(|e| format!("save a: {e}"))?;

    let mut rec_b = base;
    rec_b.status = Status::Error;
    let staged_b = s.save_result(&mut b, &rec_b).await;

    s.commit_snapshot(a)
        .await
        .map_err(|e| format!("commit a: {e}"))?;

    // Backends may reject either at save or at commit.
    let outcome = match staged_b {
        Ok(_) => s.commit_snapshot(b).await,
        Err(e) => {
            let _ = s.abort_snapshot(b).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        Err(e) => return Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(()) => return Err("lost update: both unlocked saves committed".to_string()),
    }
    let stored = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if stored.status != Status::Opened || stored.version != 1 {
        return Err(format!(
            "expected Opened v1, got {} v{}",
            stored.status, stored.version
        ));
    }
    Ok(())
}

async fn save_preserves_internal_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_result(&s, "aaaaaaa", 1).await?;
    let original = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut rec = s
        .get_result_for_update(&mut snap, "aaaaaaa")
        .await
        .map_err(|e| e.to_string())?;
    rec.id = original.id + 1000;
    rec.reported = true;
    s.save_result(&mut snap, &rec)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stored = s.get_result("aaaaaaa").await.map_err(|e| e.to_string())?;
    if stored.id != original.id {
        return Err(format!(
            "internal id changed from {} to {}",
            original.id, stored.id
        ));
    }
    if !stored.reported {
        return Err("mutable field not saved".to_string());
    }
    Ok(())
}
