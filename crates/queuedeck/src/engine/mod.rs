//! Per-queue control over an external job engine.
//!
//! [`QueueControlPort`] is implemented once per backing engine. Implementors
//! supply the native primitives (`is_paused`, `native_counts`, `fetch_jobs`, ...);
//! the domain contract (`describe`, `list_jobs`, `clone_job`, `retry_all_jobs`, ...)
//! is built on top of them in the provided methods so every engine shares it.
//!
//! Adapters are single-use: open one through a [`QueueConnector`], make one or
//! more calls, then [`QueueControlPort::close`] it. Dropping an adapter on an
//! early-return path releases its connection as well.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{
    distinct_ids, BulkReport, Job, JobCounts, JobState, NativeCounts, Queue, QueueDescriptor,
    QueueStatus,
};
use crate::error::{QueueError, Result};
use crate::redact::redact_payload;

pub mod bull;
pub mod memory;
pub mod record;
pub mod registry;

pub use bull::{BullAdapter, BullConnector};
pub use memory::{MemoryAdapter, MemoryConnector, MemoryEngine};
pub use record::EngineJob;
pub use registry::{ConnectionLease, ConnectionRegistry};

/// Size of the failed-job window `retry_all_jobs` fetches per round.
pub const RETRY_ALL_WINDOW: u64 = 100;

/// Job name used for jobs enqueued from the dashboard.
pub const DEFAULT_JOB_NAME: &str = "process";

/// Opens adapters bound to one queue descriptor.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    async fn open(&self, queue: &QueueDescriptor) -> Result<Box<dyn QueueControlPort>>;
}

#[async_trait]
pub trait QueueControlPort: Send + Sync {
    fn descriptor(&self) -> &QueueDescriptor;

    // ----------------------------
    // Engine primitives
    // ----------------------------

    async fn is_paused(&self) -> Result<bool>;

    async fn native_counts(&self) -> Result<NativeCounts>;

    /// Records in `[start, end]` (inclusive) of the state's ordered list.
    async fn fetch_jobs(&self, state: JobState, start: u64, end: u64) -> Result<Vec<EngineJob>>;

    async fn fetch_job(&self, id: &str) -> Result<Option<(EngineJob, Option<JobState>)>>;

    /// Stores a new waiting job. Lands in the paused list if the queue is paused.
    async fn enqueue(&self, id: &str, name: &str, payload: serde_json::Value) -> Result<()>;

    /// `false` when the job is gone or held by a worker lock.
    async fn remove_job(&self, id: &str) -> Result<bool>;

    /// Moves a failed job back to waiting. `false` when missing or not failed.
    async fn retry_job(&self, id: &str) -> Result<bool>;

    async fn set_paused(&self, paused: bool) -> Result<()>;

    /// Releases the engine connection.
    fn close(self: Box<Self>);

    // ----------------------------
    // Domain contract
    // ----------------------------

    async fn status(&self) -> Result<QueueStatus> {
        Ok(QueueStatus::from_paused(self.is_paused().await?))
    }

    async fn job_counts(&self) -> Result<JobCounts> {
        let status = self.status().await?;
        let native = self.native_counts().await?;
        Ok(JobCounts::reclassify(native, status))
    }

    async fn job_count_by_state(&self, state: JobState) -> Result<u64> {
        Ok(self.job_counts().await?.get(state))
    }

    async fn describe(&self) -> Result<Queue> {
        let status = self.status().await?;
        let native = self.native_counts().await?;

        Ok(Queue {
            descriptor: self.descriptor().clone(),
            status,
            job_counts: JobCounts::reclassify(native, status),
        })
    }

    async fn list_jobs(&self, state: JobState, start: u64, end: u64) -> Result<Vec<Job>> {
        if end < start {
            return Ok(Vec::new());
        }

        let records = self.fetch_jobs(state, start, end).await?;
        Ok(records
            .into_iter()
            .map(|r| r.into_summary(state))
            .collect())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self
            .fetch_job(id)
            .await?
            .map(|(record, state)| record.into_job(state)))
    }

    /// Enqueues `payload` under a fresh time-ordered id and returns the id.
    async fn add_job(&self, payload: serde_json::Value) -> Result<String> {
        let id = uuid::Uuid::now_v7().to_string();
        self.enqueue(&id, DEFAULT_JOB_NAME, payload).await?;
        Ok(id)
    }

    /// Re-enqueues the payload of `id` as a new job. `false` if `id` is gone.
    async fn clone_job(&self, id: &str) -> Result<bool> {
        let Some((source, _)) = self.fetch_job(id).await? else {
            return Ok(false);
        };

        let new_id = self.add_job(source.data).await?;
        info!(queue = %self.descriptor().name, source = id, new_id = %new_id, "cloned job");
        Ok(true)
    }

    /// Full engine record as pretty JSON, with this queue's compliance fields hidden.
    async fn export_job(&self, id: &str) -> Result<Option<String>> {
        let Some((mut record, _)) = self.fetch_job(id).await? else {
            return Ok(None);
        };

        redact_payload(&self.descriptor().compliance_pattern(), &mut record.data);

        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| QueueError::engine(self.descriptor().endpoint(), e))?;
        Ok(Some(content))
    }

    async fn delete_jobs(&self, ids: &[String]) -> Result<BulkReport> {
        let ids = distinct_ids(ids);
        let outcomes = try_join_all(ids.into_iter().map(|id| async move {
            let removed = self.remove_job(&id).await?;
            Ok::<_, QueueError>((id, removed))
        }))
        .await?;

        let report = BulkReport::from_outcomes(outcomes);
        info!(
            queue = %self.descriptor().name,
            removed = report.applied.len(),
            skipped = report.skipped.len(),
            "deleted jobs"
        );
        Ok(report)
    }

    async fn retry_jobs(&self, ids: &[String]) -> Result<BulkReport> {
        let ids = distinct_ids(ids);
        let outcomes = try_join_all(ids.into_iter().map(|id| async move {
            let retried = self.retry_job(&id).await?;
            Ok::<_, QueueError>((id, retried))
        }))
        .await?;

        let report = BulkReport::from_outcomes(outcomes);
        info!(
            queue = %self.descriptor().name,
            retried = report.applied.len(),
            skipped = report.skipped.len(),
            "retried jobs"
        );
        Ok(report)
    }

    /// Retries failed jobs window by window until a fetch comes back empty.
    ///
    /// Not isolated from concurrent failures: a job failing while this runs
    /// may or may not be picked up. `cancel` is checked between windows.
    async fn retry_all_jobs(&self, cancel: &CancellationToken) -> Result<u64> {
        let mut retried = 0u64;

        loop {
            if cancel.is_cancelled() {
                info!(queue = %self.descriptor().name, retried, "retry-all cancelled");
                return Err(QueueError::Cancelled);
            }

            let window = self
                .fetch_jobs(JobState::Failed, 0, RETRY_ALL_WINDOW - 1)
                .await?;
            if window.is_empty() {
                break;
            }

            let outcomes = try_join_all(window.iter().map(|job| self.retry_job(&job.id))).await?;
            let moved = outcomes.into_iter().filter(|ok| *ok).count() as u64;

            if moved == 0 {
                // Every job in the window was refused; fetching again would return the same window.
                warn!(
                    queue = %self.descriptor().name,
                    stuck = window.len(),
                    "retry-all stopped on a window of jobs the engine would not retry"
                );
                break;
            }
            retried += moved;
        }

        info!(queue = %self.descriptor().name, retried, "retry-all finished");
        Ok(retried)
    }

    async fn pause(&self) -> Result<()> {
        self.set_paused(true).await?;
        info!(queue = %self.descriptor().name, "queue paused");
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.set_paused(false).await?;
        info!(queue = %self.descriptor().name, "queue resumed");
        Ok(())
    }
}

/// Engine options stored with a job enqueued from the dashboard. Completed and
/// failed jobs are kept so their history stays inspectable.
pub(crate) fn default_job_opts(id: &str, timestamp: i64) -> serde_json::Value {
    json!({
        "jobId": id,
        "attempts": 1,
        "delay": 0,
        "timestamp": timestamp,
        "removeOnComplete": false,
        "removeOnFail": false,
    })
}
