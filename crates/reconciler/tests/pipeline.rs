mod support;

use reconciler::MappingStatus;
use support::{Harness, TENANT};

#[tokio::test]
async fn first_pass_creates_and_second_pass_is_quiet() {
    let h = Harness::new();
    h.seed_case("POB-1");
    h.ingestor.ingest(TENANT, "POB-1").await.unwrap();

    let first = h.orchestrator.run_pipeline().await;
    assert_eq!(first.push.transitioned, 1);
    assert_eq!(first.finalize.unchanged, 1);
    assert_eq!(first.failed(), 0);

    let second = h.orchestrator.run_pipeline().await;
    assert_eq!(second.detect.examined, 1);
    assert_eq!(second.detect.unchanged, 1);
    assert_eq!(second.pull.examined, 0);
    assert_eq!(second.push.examined, 0);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(h.tracker.created_count(), 1);
}

#[tokio::test]
async fn tracker_edit_is_pulled_and_closure_retires_in_one_pass() {
    let h = Harness::new();
    let synced = h.mirrored("POB-1").await.last_synced_to_tracker.unwrap();
    h.tracker.set_description("JIR-9", "Replaced toner");
    h.tracker.set_updated("JIR-9", synced.plus_seconds(60));

    let edited = h.orchestrator.run_pipeline().await;
    assert_eq!(edited.detect.transitioned, 1);
    assert_eq!(edited.pull.transitioned, 1);
    assert_eq!(
        h.mapping("POB-1").await.unwrap().status,
        MappingStatus::Mirrored
    );

    h.tracker.set_status("JIR-9", "Done");
    let closed = h.orchestrator.run_pipeline().await;
    assert_eq!(closed.finalize.removed, 1);
    assert!(h.mapping("POB-1").await.is_none());
}

#[tokio::test]
async fn self_healed_mapping_is_recreated_in_the_same_pass() {
    let h = Harness::new();
    h.mirrored("POB-1").await;
    h.tracker.delete_issue("JIR-9");

    let report = h.orchestrator.run_pipeline().await;

    assert_eq!(report.detect.self_healed, 1);
    assert_eq!(report.push.transitioned, 1);
    let mapping = h.mapping("POB-1").await.unwrap();
    assert_eq!(mapping.status, MappingStatus::Mirrored);
    assert_eq!(mapping.tracker_key.unwrap().as_str(), "JIR-10");
}
