use lure_storage::conformance::run_conformance_suite;
use lure_storage::MemoryStorage;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_storage_passes_conformance() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert!(report.failed == 0, "{report}");
    assert!(report.total > 30, "suite ran only {} checks", report.total);
}
