//! Conformance test suite for `TrackingStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `TrackingStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Insertion**: result creation, identifier uniqueness
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: event append and result save commit together or not at all
//! - **Version validation / OCC**: stale saves rejected
//! - **Event log**: append order, campaign and result filters, foreign keys
//! - **Concurrency**: row locking serializes read-modify-write on one result
//! - **Error handling**: correct error variants for invalid operations
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use lure_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod events;
mod insert;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use lure_core::{EventKind, Status};
use time::macros::datetime;

use crate::record::{NewEvent, NewResult, Recipient};
use crate::TrackingStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "insert", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "insert_creates_result_at_version_0").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: TrackingStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(events::run_event_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_new_result(rid: &str, campaign_id: i64) -> NewResult {
    NewResult {
        campaign_id,
        rid: rid.to_string(),
        recipient: Recipient {
            email: format!("{rid}@example.com"),
            first_name: "Test".to_string(),
            last_name: "Recipient".to_string(),
            position: "Tester".to_string(),
        },
        status: Status::Scheduled,
        send_date: datetime!(2025-01-01 0:00 UTC),
        modified_date: datetime!(2025-01-01 0:00 UTC),
    }
}

fn make_event(rid: &str, campaign_id: i64, kind: EventKind) -> NewEvent {
    NewEvent {
        campaign_id,
        rid: rid.to_string(),
        email: format!("{rid}@example.com"),
        time: datetime!(2025-01-01 0:05 UTC),
        kind,
        details: Some(serde_json::json!({"browser": {"address": "203.0.113.1"}})),
        is_screened: false,
    }
}

/// Insert and commit a result in its own snapshot.
async fn seed_result<S: TrackingStorage>(
    s: &S,
    rid: &str,
    campaign_id: i64,
) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_result(&mut snap, make_new_result(rid, campaign_id))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}
