use std::future::Future;
use std::sync::Arc;

use super::{make_new_result, seed_result, TestResult};
use crate::{StorageError, TrackingStorage};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "locked_updates_never_lose_writes",
        locked_updates_never_lose_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_insert_same_rid_exactly_one_wins",
        concurrent_insert_same_rid_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_results_all_succeed",
        concurrent_updates_different_results_all_succeed(factory).await,
    ));

    results
}

// ── Row lock serializes read-modify-write ────────────────────────────────────

/// N tasks each lock the same result, increment a counter field and commit.
/// The row lock makes every task see its predecessor's commit, so all N
/// succeed and no increment is lost.
async fn locked_updates_never_lose_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_result(storage.as_ref(), "aaaaaaa", 1).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let mut rec = s.get_result_for_update(&mut snap, "aaaaaaa").await?;
            tokio::task::yield_now().await;
            rec.latitude += 1.0;
            s.save_result(&mut snap, &rec).await?;
            s.commit_snapshot(snap).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let stored = storage
        .get_result("aaaaaaa")
        .await
        .map_err(|e| e.to_string())?;
    if stored.latitude != N as f64 {
        return Err(format!(
            "lost update: counter is {}, expected {N}",
            stored.latitude
        ));
    }
    if stored.version != N as i64 {
        return Err(format!(
            "expected version {N}, got {}",
            stored.version
        ));
    }
    Ok(())
}

// ── Concurrent creation: exactly one wins ────────────────────────────────────

/// N tasks each insert the same rid. Exactly one commit lands; the rest get
/// DuplicateResultId at insert or at commit.
async fn concurrent_insert_same_rid_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let inserted = s
                .insert_result(&mut snap, make_new_result("aaaaaaa", i as i64))
                .await;
            let committed = match inserted {
                Ok(_) => s.commit_snapshot(snap).await,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            };
            match committed {
                Ok(()) => Ok(true),
                Err(StorageError::DuplicateResultId { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Concurrent updates to different results: all succeed ─────────────────────

/// No false conflicts when there is no contention.
async fn concurrent_updates_different_results_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let rids: Vec<String> = (0..N).map(|i| format!("rid{i:04}")).collect();
    for rid in &rids {
        seed_result(storage.as_ref(), rid, 1).await?;
    }

    let mut handles = Vec::new();
    for rid in rids.clone() {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let mut rec = s.get_result_for_update(&mut snap, &rid).await?;
            rec.reported = true;
            s.save_result(&mut snap, &rec).await?;
            s.commit_snapshot(snap).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    for rid in &rids {
        let rec = storage.get_result(rid).await.map_err(|e| e.to_string())?;
        if !rec.reported || rec.version != 1 {
            return Err(format!(
                "{rid}: expected reported at v1, got reported={} v{}",
                rec.reported, rec.version
            ));
        }
    }
    Ok(())
}
