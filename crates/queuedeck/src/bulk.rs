//! Fan-out of control operations over many queues, or over many jobs of one queue.

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{distinct_ids, BulkReport, ExportedJob, QueueDescriptor};
use crate::engine::{QueueConnector, QueueControlPort};
use crate::error::{QueueError, Result};
use crate::repo::DescriptorRepository;

pub(crate) fn boxed<'a, T>(
    fut: impl std::future::Future<Output = T> + Send + 'a,
) -> BoxFuture<'a, T> {
    Box::pin(fut)
}

#[derive(Clone)]
pub struct BulkCoordinator {
    repo: Arc<dyn DescriptorRepository>,
    connector: Arc<dyn QueueConnector>,
}

impl BulkCoordinator {
    pub fn new(repo: Arc<dyn DescriptorRepository>, connector: Arc<dyn QueueConnector>) -> Self {
        Self { repo, connector }
    }

    pub async fn resolve_queue(&self, id: &str) -> Result<QueueDescriptor> {
        self.repo
            .find_queue(id)
            .await?
            .ok_or_else(|| QueueError::QueueNotFound(id.to_string()))
    }

    /// Opens an adapter for `queue`, runs `op` on it and closes it again.
    ///
    /// The adapter is closed whatever `op` returns; if `op` panics or the
    /// future is dropped, the adapter's drop releases the connection instead.
    pub async fn with_adapter<T, F>(&self, queue: &QueueDescriptor, op: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a dyn QueueControlPort) -> BoxFuture<'a, Result<T>>,
    {
        let port = self.connector.open(queue).await?;
        let result = op(port.as_ref()).await;
        port.close();
        result
    }

    // ----------------------------
    // Queue scope
    // ----------------------------

    pub async fn pause_queues(&self, ids: &[String]) -> Result<BulkReport> {
        self.set_paused_many(ids, true).await
    }

    pub async fn resume_queues(&self, ids: &[String]) -> Result<BulkReport> {
        self.set_paused_many(ids, false).await
    }

    /// Every distinct id is attempted even if another one fails; the first
    /// engine error is returned once all of them have finished.
    async fn set_paused_many(&self, ids: &[String], paused: bool) -> Result<BulkReport> {
        let ids = distinct_ids(ids);

        let results = join_all(ids.into_iter().map(|id| async move {
            let Some(queue) = self.repo.find_queue(&id).await? else {
                return Ok::<_, QueueError>((id, false));
            };

            self.with_adapter(&queue, move |port| {
                boxed(async move {
                    if paused {
                        port.pause().await
                    } else {
                        port.resume().await
                    }
                })
            })
            .await?;

            Ok((id, true))
        }))
        .await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(error = %e, paused, "queue toggle failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let report = BulkReport::from_outcomes(outcomes);
        info!(
            paused,
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "toggled queues"
        );
        if !report.is_complete() {
            debug!(skipped = ?report.skipped, "queue ids did not resolve");
        }
        Ok(report)
    }

    // ----------------------------
    // Job scope, inside one queue
    // ----------------------------

    pub async fn delete_jobs(&self, queue: &QueueDescriptor, ids: &[String]) -> Result<BulkReport> {
        let ids = ids.to_vec();
        self.with_adapter(queue, move |port| {
            boxed(async move { port.delete_jobs(&ids).await })
        })
        .await
    }

    pub async fn retry_jobs(&self, queue: &QueueDescriptor, ids: &[String]) -> Result<BulkReport> {
        let ids = ids.to_vec();
        self.with_adapter(queue, move |port| {
            boxed(async move { port.retry_jobs(&ids).await })
        })
        .await
    }

    pub async fn retry_all_jobs(
        &self,
        queue: &QueueDescriptor,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let cancel = cancel.clone();
        self.with_adapter(queue, move |port| {
            boxed(async move { port.retry_all_jobs(&cancel).await })
        })
        .await
    }

    pub async fn clone_job(&self, queue: &QueueDescriptor, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();
        self.with_adapter(queue, move |port| {
            boxed(async move { port.clone_job(&job_id).await })
        })
        .await
    }

    pub async fn export_job(
        &self,
        queue: &QueueDescriptor,
        job_id: &str,
    ) -> Result<Option<ExportedJob>> {
        let id = job_id.to_string();
        let content = self
            .with_adapter(queue, move |port| {
                boxed(async move { port.export_job(&id).await })
            })
            .await?;

        Ok(content.map(|content| ExportedJob {
            filename: ExportedJob::filename_for(&queue.id, job_id),
            content,
        }))
    }

    pub async fn add_job(&self, queue: &QueueDescriptor, payload: Value) -> Result<String> {
        self.with_adapter(queue, move |port| {
            boxed(async move { port.add_job(payload).await })
        })
        .await
    }
}
