mod support;

use std::sync::Arc;

use reconciler::{IngestError, MappingStatus, MappingStore, ValidationError};
use rstest::rstest;
use support::{Harness, TENANT};

#[tokio::test]
async fn repeated_ingest_keeps_one_mapping() {
    let h = Harness::new();

    let first = h.ingestor.ingest(TENANT, "POB-1").await.unwrap();
    let second = h.ingestor.ingest(TENANT, "POB-1").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.store.find_all().await.unwrap().len(), 1);
    assert_eq!(second.status, MappingStatus::CaseChanged);
    assert!(second.modified_at.is_some());
}

#[tokio::test]
async fn concurrent_ingests_of_one_case_keep_one_mapping() {
    let h = Arc::new(Harness::new());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.ingestor.ingest(TENANT, "POB-1").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.store.find_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn same_case_key_in_other_tenant_is_separate() {
    let h = Harness::new();

    h.ingestor.ingest(TENANT, "POB-1").await.unwrap();
    h.ingestor.ingest("0180", "POB-1").await.unwrap();

    assert_eq!(h.store.find_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn mirrored_mapping_returns_to_case_changed() {
    let h = Harness::new();
    let mirrored = h.mirrored("POB-1").await;

    let ingested = h.ingestor.ingest(TENANT, "POB-1").await.unwrap();

    assert_eq!(ingested.status, MappingStatus::CaseChanged);
    assert_eq!(ingested.tracker_key, mirrored.tracker_key);
}

#[tokio::test]
async fn pending_tracker_change_is_not_overridden() {
    let h = Harness::new();
    let synced = h.mirrored("POB-1").await.last_synced_to_tracker.unwrap();
    h.tracker.set_updated("JIR-9", synced.plus_seconds(60));
    h.engine.detect_tracker_changes().await;

    let ingested = h.ingestor.ingest(TENANT, "POB-1").await.unwrap();

    assert_eq!(ingested.status, MappingStatus::TrackerChanged);
}

#[rstest]
#[case::short_tenant("228", "POB-1")]
#[case::alphabetic_tenant("abcd", "POB-1")]
#[case::empty_tenant("", "POB-1")]
#[case::blank_case_key(TENANT, "   ")]
#[tokio::test]
async fn malformed_input_is_rejected_before_the_store(#[case] tenant: &str, #[case] case_key: &str) {
    let h = Harness::new();

    let err = h.ingestor.ingest(tenant, case_key).await.unwrap_err();

    assert!(matches!(err, IngestError::Validation(_)));
    assert!(h.store.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn overlong_case_key_is_rejected() {
    let h = Harness::new();
    let key = "K".repeat(reconciler::MAX_CASE_KEY_LEN + 1);

    let err = h.ingestor.ingest(TENANT, &key).await.unwrap_err();

    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::InvalidCaseKey { .. })
    ));
}

#[tokio::test]
async fn input_is_trimmed() {
    let h = Harness::new();

    let mapping = h.ingestor.ingest(" 2281 ", " POB-1 ").await.unwrap();

    assert_eq!(mapping.tenant_id.as_str(), "2281");
    assert_eq!(mapping.case_key.as_str(), "POB-1");
}
