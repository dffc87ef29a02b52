mod common;

use common::{setup, INVOICES, RECEIPTS, REFUNDS};
use queuedeck::domain::JobState;
use queuedeck::QueueError;

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn pause_queues_skips_unknown_ids() {
    let fx = setup();
    fx.seed_many(INVOICES, JobState::Waiting, 2);

    let report = fx
        .control
        .pause_queues(&ids(&[INVOICES, "q-gone", RECEIPTS]))
        .await
        .unwrap();

    assert_eq!(report.applied, ids(&[INVOICES, RECEIPTS]));
    assert_eq!(report.skipped, ids(&["q-gone"]));
    assert!(fx.engine(INVOICES).paused());
    assert!(fx.engine(RECEIPTS).paused());
    assert!(!fx.engine(REFUNDS).paused());
    assert_eq!(fx.engine(INVOICES).ids_in(JobState::Paused).len(), 2);
}

#[tokio::test]
async fn duplicate_ids_open_one_adapter_per_queue() {
    let fx = setup();

    let report = fx
        .control
        .pause_queues(&ids(&[INVOICES, INVOICES, INVOICES]))
        .await
        .unwrap();

    assert_eq!(report.applied, ids(&[INVOICES]));
    assert!(report.is_complete());
    assert_eq!(fx.connector.registry().connections(), 1);
    assert_eq!(fx.leases(), 0);
}

#[tokio::test]
async fn resume_queues_undoes_pause() {
    let fx = setup();
    let all = ids(&[INVOICES, RECEIPTS, REFUNDS]);

    fx.control.pause_queues(&all).await.unwrap();
    let report = fx.control.resume_queues(&all).await.unwrap();

    assert_eq!(report.applied, all);
    for id in [INVOICES, RECEIPTS, REFUNDS] {
        assert!(!fx.engine(id).paused());
    }
}

#[tokio::test]
async fn engine_failure_still_toggles_the_other_queues() {
    let fx = setup();
    fx.engine(RECEIPTS).set_reachable(false);

    let err = fx
        .control
        .pause_queues(&ids(&[INVOICES, RECEIPTS, REFUNDS]))
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::EngineUnavailable { .. }));
    assert!(fx.engine(INVOICES).paused());
    assert!(fx.engine(REFUNDS).paused());
    assert_eq!(fx.leases(), 0);
}

#[tokio::test]
async fn connections_are_reused_across_calls() {
    let fx = setup();

    for _ in 0..5 {
        fx.control.describe_queue(INVOICES).await.unwrap();
    }

    assert_eq!(fx.connector.registry().connections(), 1);
    assert_eq!(fx.leases(), 0);

    assert_eq!(fx.connector.registry().shutdown(), 1);
    let err = fx.control.describe_queue(INVOICES).await.unwrap_err();
    assert!(matches!(err, QueueError::EngineUnavailable { .. }));
}
