mod common;

use common::{setup, INVOICES, RECEIPTS, WELCOME};
use queuedeck::domain::{JobState, QueueStatus};
use queuedeck::QueueError;

use serde_json::json;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn paused_queue_reports_backlog_as_paused() {
    let fx = setup();
    fx.seed_many(INVOICES, JobState::Waiting, 3);
    fx.seed_many(INVOICES, JobState::Failed, 2);

    let running = fx.control.describe_queue(INVOICES).await.unwrap();
    assert_eq!(running.status, QueueStatus::Running);
    assert_eq!((running.job_counts.waiting, running.job_counts.paused), (3, 0));

    fx.control.pause_queue(INVOICES).await.unwrap();
    // A job added while paused joins the paused backlog.
    fx.control.add_job(INVOICES, json!({"late": true})).await.unwrap();

    let paused = fx.control.describe_queue(INVOICES).await.unwrap();
    assert_eq!(paused.status, QueueStatus::Paused);
    assert_eq!((paused.job_counts.waiting, paused.job_counts.paused), (0, 4));
    assert_eq!(paused.job_counts.failed, 2);

    fx.control.resume_queue(INVOICES).await.unwrap();
    let resumed = fx.control.describe_queue(INVOICES).await.unwrap();
    assert_eq!((resumed.job_counts.waiting, resumed.job_counts.paused), (4, 0));
    assert_eq!(fx.leases(), 0);
}

#[tokio::test]
async fn pause_and_resume_are_idempotent() {
    let fx = setup();
    fx.seed_many(RECEIPTS, JobState::Waiting, 2);

    fx.control.pause_queue(RECEIPTS).await.unwrap();
    fx.control.pause_queue(RECEIPTS).await.unwrap();
    assert_eq!(fx.engine(RECEIPTS).ids_in(JobState::Paused).len(), 2);

    fx.control.resume_queue(RECEIPTS).await.unwrap();
    fx.control.resume_queue(RECEIPTS).await.unwrap();
    assert!(!fx.engine(RECEIPTS).paused());
    assert_eq!(fx.engine(RECEIPTS).ids_in(JobState::Waiting).len(), 2);
}

#[tokio::test]
async fn add_job_returns_time_ordered_ids() {
    let fx = setup();

    let first = fx.control.add_job(INVOICES, json!({"n": 1})).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = fx.control.add_job(INVOICES, json!({"n": 2})).await.unwrap();

    assert!(first < second, "{first} should sort before {second}");
    let job = fx.control.get_job(INVOICES, &second).await.unwrap();
    assert_eq!(job.data, Some(json!({"n": 2})));
    assert_eq!(job.state, Some(JobState::Waiting));

    let opts = fx.engine(INVOICES).job(&second).unwrap().opts;
    assert_eq!(opts["removeOnComplete"], json!(false));
    assert_eq!(opts["removeOnFail"], json!(false));
}

#[tokio::test]
async fn clone_copies_payload_into_a_new_job() {
    let fx = setup();
    let payload = json!({"invoice": 42, "lines": [{"sku": "A", "qty": 2}]});
    let source = fx.seed(INVOICES, JobState::Completed, payload.clone());

    assert!(fx.control.clone_job(INVOICES, &source).await.unwrap());

    let engine = fx.engine(INVOICES);
    let waiting = engine.ids_in(JobState::Waiting);
    assert_eq!(waiting.len(), 1);
    assert_ne!(waiting[0], source);
    assert_eq!(engine.job(&waiting[0]).unwrap().data, payload);
}

#[tokio::test]
async fn clone_of_missing_job_is_false_and_creates_nothing() {
    let fx = setup();

    let cloned = fx.control.clone_job(INVOICES, "no-such-job").await.unwrap();

    assert!(!cloned);
    assert_eq!(fx.engine(INVOICES).job_count(), 0);
}

#[tokio::test]
async fn get_job_formats_failure_details() {
    let fx = setup();
    let id = fx.seed(INVOICES, JobState::Failed, json!({"invoice": 7}));

    let job = fx.control.get_job(INVOICES, &id).await.unwrap();

    assert_eq!(job.state, Some(JobState::Failed));
    assert_eq!(job.failed_reason.as_deref(), Some("job failed"));
    let trace = job.stacktrace.unwrap();
    assert_eq!(trace[0].order, 0);
    assert_eq!(trace[0].content, "Error: job failed");
    assert!(job.finished_at.is_some());
}

#[tokio::test]
async fn get_job_hides_compliance_fields() {
    let fx = setup();
    let id = fx.seed(
        WELCOME,
        JobState::Waiting,
        json!({"token": "abc", "secret": "xyz", "other": "keep"}),
    );

    let job = fx.control.get_job(WELCOME, &id).await.unwrap();

    assert_eq!(
        job.data,
        Some(json!({"token": "{{hidden}}", "secret": "{{hidden}}", "other": "keep"}))
    );
    // Stored payload is untouched.
    assert_eq!(fx.engine(WELCOME).job(&id).unwrap().data["token"], json!("abc"));
}

#[tokio::test]
async fn missing_job_and_queue_are_not_found() {
    let fx = setup();

    let err = fx.control.get_job(INVOICES, "nope").await.unwrap_err();
    assert!(matches!(err, QueueError::JobNotFound { .. }));
    assert_eq!(err.to_string(), "Job not found");

    let err = fx.control.describe_queue("q-unknown").await.unwrap_err();
    assert!(matches!(err, QueueError::QueueNotFound(_)));
    assert_eq!(err.to_string(), "Queue not found");

    let err = fx.control.export_job(INVOICES, "nope").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn pages_cover_every_job_exactly_once() {
    let fx = setup();
    let seeded: HashSet<String> = fx
        .seed_many(RECEIPTS, JobState::Completed, 53)
        .into_iter()
        .collect();

    let size = 25u64;
    let mut seen = HashSet::new();
    for page in 1..=53u64.div_ceil(size) {
        let listed = fx
            .control
            .list_jobs(RECEIPTS, JobState::Completed, page, size)
            .await
            .unwrap();
        assert_eq!(listed.total, 53);
        for job in listed.jobs {
            assert_eq!(job.data, None, "list view carries no payload");
            assert!(seen.insert(job.id), "job listed twice");
        }
    }

    assert_eq!(seen, seeded);

    let beyond = fx
        .control
        .list_jobs(RECEIPTS, JobState::Completed, 4, size)
        .await
        .unwrap();
    assert!(beyond.jobs.is_empty());
    assert_eq!(beyond.total, 53);

    let far_beyond = fx
        .control
        .list_jobs(RECEIPTS, JobState::Completed, 1 << 62, 4)
        .await
        .unwrap();
    assert!(far_beyond.jobs.is_empty());
}

#[tokio::test]
async fn paused_queue_totals_follow_reclassified_counts() {
    let fx = setup();
    fx.seed_many(INVOICES, JobState::Waiting, 3);
    fx.control.pause_queue(INVOICES).await.unwrap();

    let waiting = fx
        .control
        .list_jobs(INVOICES, JobState::Waiting, 1, 10)
        .await
        .unwrap();
    assert!(waiting.jobs.is_empty());
    assert_eq!(waiting.total, 0);

    let paused = fx
        .control
        .list_jobs(INVOICES, JobState::Paused, 1, 2)
        .await
        .unwrap();
    assert_eq!(paused.jobs.len(), 2);
    assert_eq!(paused.total, 3);
}

#[tokio::test]
async fn first_page_lists_newest_first() {
    let fx = setup();
    let ids = fx.seed_many(RECEIPTS, JobState::Waiting, 3);

    let page = fx
        .control
        .list_jobs(RECEIPTS, JobState::Waiting, 1, 2)
        .await
        .unwrap();

    let listed: Vec<&str> = page.jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(listed, vec![ids[2].as_str(), ids[1].as_str()]);
}

#[tokio::test]
async fn delete_skips_missing_ids() {
    let fx = setup();
    let valid = fx.seed(INVOICES, JobState::Failed, json!({}));
    let ids = vec![valid.clone(), "missing".to_string()];

    let report = fx.control.delete_jobs(INVOICES, &ids).await.unwrap();

    assert_eq!(report.applied, vec![valid.clone()]);
    assert_eq!(report.skipped, vec!["missing".to_string()]);
    let engine = fx.engine(INVOICES);
    assert!(engine.job(&valid).is_none());
    assert!(engine.job("missing").is_none());
    assert_eq!(engine.job_count(), 0);
}

#[tokio::test]
async fn delete_leaves_locked_jobs_alone() {
    let fx = setup();
    let engine = fx.engine(INVOICES);
    let locked = fx.seed(INVOICES, JobState::Active, json!({}));
    engine.lock_job(&locked);

    let report = fx
        .control
        .delete_jobs(INVOICES, &[locked.clone()])
        .await
        .unwrap();

    assert!(report.applied.is_empty());
    assert_eq!(report.skipped, vec![locked.clone()]);
    assert_eq!(engine.state_of(&locked), Some(JobState::Active));
}

#[tokio::test]
async fn retry_moves_failed_jobs_and_skips_the_rest() {
    let fx = setup();
    let failed = fx.seed(INVOICES, JobState::Failed, json!({}));
    let done = fx.seed(INVOICES, JobState::Completed, json!({}));
    let ids = vec![failed.clone(), done.clone(), failed.clone(), "missing".to_string()];

    let report = fx.control.retry_jobs(INVOICES, &ids).await.unwrap();

    assert_eq!(report.applied, vec![failed.clone()]);
    assert_eq!(report.skipped, vec![done.clone(), "missing".to_string()]);

    let engine = fx.engine(INVOICES);
    assert_eq!(engine.state_of(&failed), Some(JobState::Waiting));
    assert_eq!(engine.state_of(&done), Some(JobState::Completed));
    assert_eq!(engine.job(&failed).unwrap().failed_reason, None);
}

#[tokio::test]
async fn retry_all_drains_more_than_one_window() {
    let fx = setup();
    fx.seed_many(INVOICES, JobState::Failed, 150);

    let retried = fx
        .control
        .retry_all_jobs(INVOICES, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(retried, 150);
    let queue = fx.control.describe_queue(INVOICES).await.unwrap();
    assert_eq!(queue.job_counts.failed, 0);
    assert_eq!(queue.job_counts.waiting, 150);
}

#[tokio::test]
async fn retry_all_stops_on_a_window_it_cannot_retry() {
    let fx = setup();
    let engine = fx.engine(INVOICES);
    for id in fx.seed_many(INVOICES, JobState::Failed, 3) {
        engine.lock_job(&id);
    }

    let retried = fx
        .control
        .retry_all_jobs(INVOICES, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(retried, 0);
    assert_eq!(engine.ids_in(JobState::Failed).len(), 3);
}

#[tokio::test]
async fn cancelled_retry_all_leaves_failed_jobs() {
    let fx = setup();
    fx.seed_many(INVOICES, JobState::Failed, 5);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fx
        .control
        .retry_all_jobs(INVOICES, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Cancelled));
    assert_eq!(fx.engine(INVOICES).ids_in(JobState::Failed).len(), 5);
    assert_eq!(fx.leases(), 0);
}

#[tokio::test]
async fn export_is_pretty_json_with_hidden_fields() {
    let fx = setup();
    let id = fx.seed(
        WELCOME,
        JobState::Completed,
        json!({"token": "abc", "email": "a@b.c"}),
    );

    let export = fx.control.export_job(WELCOME, &id).await.unwrap();

    assert_eq!(export.filename, format!("queue_{WELCOME}-job_{id}.json"));
    assert!(export.content.contains('\n'), "pretty printed");
    let record: serde_json::Value = serde_json::from_str(&export.content).unwrap();
    assert_eq!(record["id"], json!(id));
    assert_eq!(record["data"], json!({"token": "{{hidden}}", "email": "a@b.c"}));
    assert_eq!(record["opts"]["removeOnFail"], json!(false));
    assert!(record.get("returnvalue").is_some());
}

#[tokio::test]
async fn unreachable_engine_fails_and_releases_nothing() {
    let fx = setup();
    fx.engine(INVOICES).set_reachable(false);

    let err = fx.control.describe_queue(INVOICES).await.unwrap_err();

    assert!(matches!(err, QueueError::EngineUnavailable { .. }));
    assert_eq!(fx.leases(), 0);
}
