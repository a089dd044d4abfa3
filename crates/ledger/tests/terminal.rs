use geonet_ledger::{run_guarded, Ledger, TaskQueue};
use geonet_protocol::{JsonMap, TaskType};
use geonet_store::{BroadcastNotifier, MemoryRepository, TaskResultStore};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn ledger() -> (Ledger, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let notifier = Arc::new(BroadcastNotifier::new());
    (Ledger::new(repo.clone(), notifier), repo)
}

#[tokio::test]
async fn panicking_body_still_completes_with_error() {
    let (ledger, repo) = ledger();
    let entry = ledger
        .create("Flood Network Failure", TaskType::FloodNetworkFailure, JsonMap::new(), 1)
        .unwrap();

    let outcome: Option<()> = run_guarded(entry.clone(), async {
        if true {
            panic!("raster missing");
        }
        Ok::<(), String>(())
    })
    .await;

    assert!(outcome.is_none());
    let stored = repo.get_task_result(entry.id()).unwrap();
    assert!(stored.is_completed());
    assert!(stored.error.unwrap().contains("raster missing"));
}

#[tokio::test]
async fn returned_errors_follow_validation_errors() {
    let (ledger, repo) = ledger();
    let entry = ledger
        .create("Network Recovery", TaskType::NetworkRecovery, JsonMap::new(), 1)
        .unwrap();
    entry.write_error("A");

    let queue = TaskQueue::new(1);
    let outcome = queue
        .schedule_guarded(entry.clone(), async { Err::<(), _>("B") })
        .join()
        .await
        .unwrap();

    assert_eq!(outcome, None);
    let stored = repo.get_task_result(entry.id()).unwrap();
    assert_eq!(stored.error.as_deref(), Some("A, B"));
    assert!(stored.status.starts_with("Completed in "));
    assert!(!stored.succeeded());
}

#[tokio::test]
async fn successful_body_returns_its_value() {
    let (ledger, repo) = ledger();
    let entry = ledger
        .create("Conversion", TaskType::Conversion, JsonMap::new(), 2)
        .unwrap();
    let body_entry = entry.clone();
    let outcome = run_guarded(entry.clone(), async move {
        let mut outputs = JsonMap::new();
        outputs.insert("datasets".into(), serde_json::json!([7]));
        body_entry.set_outputs(outputs);
        Ok::<_, String>(7u64)
    })
    .await;

    assert_eq!(outcome, Some(7));
    let stored = repo.get_task_result(entry.id()).unwrap();
    assert!(stored.succeeded());
    assert_eq!(stored.output("datasets"), Some(&serde_json::json!([7])));
}
