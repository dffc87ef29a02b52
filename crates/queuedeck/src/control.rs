//! Operations addressed by queue, job and group id.
//!
//! [`ControlPlane`] resolves ids through the descriptor repository, runs the
//! work through the bulk coordinator or dashboard aggregator, and hides each
//! queue's compliance fields before returning jobs.

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bulk::{boxed, BulkCoordinator};
use crate::dashboard::DashboardAggregator;
use crate::domain::{
    BulkReport, ExportedJob, GroupDashboard, Job, JobPage, JobState, JobWindow, Queue,
    QueueOutcome,
};
use crate::engine::QueueConnector;
use crate::error::{QueueError, Result};
use crate::redact::{redact, redact_job};
use crate::repo::DescriptorRepository;

#[derive(Clone)]
pub struct ControlPlane {
    repo: Arc<dyn DescriptorRepository>,
    bulk: BulkCoordinator,
    dashboards: DashboardAggregator,
}

impl ControlPlane {
    pub fn new(
        repo: Arc<dyn DescriptorRepository>,
        connector: Arc<dyn QueueConnector>,
        dashboard_concurrency: usize,
    ) -> Self {
        let bulk = BulkCoordinator::new(Arc::clone(&repo), connector);
        let dashboards =
            DashboardAggregator::new(Arc::clone(&repo), bulk.clone(), dashboard_concurrency);
        Self {
            repo,
            bulk,
            dashboards,
        }
    }

    pub fn bulk(&self) -> &BulkCoordinator {
        &self.bulk
    }

    pub fn dashboards(&self) -> &DashboardAggregator {
        &self.dashboards
    }

    // ----------------------------
    // Queues
    // ----------------------------

    pub async fn describe_queue(&self, id: &str) -> Result<Queue> {
        let queue = self.bulk.resolve_queue(id).await?;
        self.bulk
            .with_adapter(&queue, |port| boxed(async move { port.describe().await }))
            .await
    }

    /// Live state of every queue in a group.
    pub async fn list_queues(&self, group_id: &str) -> Result<Vec<QueueOutcome>> {
        if self.repo.find_group(group_id).await?.is_none() {
            return Err(QueueError::GroupNotFound(group_id.to_string()));
        }
        let queues = self.repo.find_queues_by_group(group_id).await?;
        Ok(self.dashboards.describe_queues(queues).await)
    }

    pub async fn pause_queue(&self, id: &str) -> Result<()> {
        let queue = self.bulk.resolve_queue(id).await?;
        self.bulk
            .with_adapter(&queue, |port| boxed(async move { port.pause().await }))
            .await
    }

    pub async fn resume_queue(&self, id: &str) -> Result<()> {
        let queue = self.bulk.resolve_queue(id).await?;
        self.bulk
            .with_adapter(&queue, |port| boxed(async move { port.resume().await }))
            .await
    }

    pub async fn pause_queues(&self, ids: &[String]) -> Result<BulkReport> {
        self.bulk.pause_queues(ids).await
    }

    pub async fn resume_queues(&self, ids: &[String]) -> Result<BulkReport> {
        self.bulk.resume_queues(ids).await
    }

    // ----------------------------
    // Jobs
    // ----------------------------

    /// One page of `state`'s job list. `page` and `size` are 1-based;
    /// `total` counts the whole state, with the paused reclassification applied.
    pub async fn list_jobs(
        &self,
        queue_id: &str,
        state: JobState,
        page: u64,
        size: u64,
    ) -> Result<JobPage> {
        let queue = self.bulk.resolve_queue(queue_id).await?;
        let window = JobWindow::from_page(page, size);
        let pattern = queue.compliance_pattern();

        let (jobs, total) = self
            .bulk
            .with_adapter(&queue, move |port| {
                boxed(async move {
                    let jobs = port.list_jobs(state, window.start, window.end).await?;
                    let total = port.job_count_by_state(state).await?;
                    Ok::<_, QueueError>((jobs, total))
                })
            })
            .await?;

        Ok(JobPage {
            jobs: jobs.into_iter().map(|job| redact_job(&pattern, job)).collect(),
            total,
        })
    }

    pub async fn get_job(&self, queue_id: &str, job_id: &str) -> Result<Job> {
        let queue = self.bulk.resolve_queue(queue_id).await?;
        let id = job_id.to_string();

        let job = self
            .bulk
            .with_adapter(&queue, move |port| {
                boxed(async move { port.get_job(&id).await })
            })
            .await?;

        redact(&queue.compliance_pattern(), job).ok_or_else(|| QueueError::JobNotFound {
            queue_id: queue_id.to_string(),
            job_id: job_id.to_string(),
        })
    }

    /// Enqueues `payload` and returns the new job's id.
    pub async fn add_job(&self, queue_id: &str, payload: Value) -> Result<String> {
        let queue = self.bulk.resolve_queue(queue_id).await?;
        self.bulk.add_job(&queue, payload).await
    }

    /// `false` when the source job no longer exists.
    pub async fn clone_job(&self, queue_id: &str, job_id: &str) -> Result<bool> {
        let queue = self.bulk.resolve_queue(queue_id).await?;
        self.bulk.clone_job(&queue, job_id).await
    }

    pub async fn export_job(&self, queue_id: &str, job_id: &str) -> Result<ExportedJob> {
        let queue = self.bulk.resolve_queue(queue_id).await?;
        self.bulk
            .export_job(&queue, job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound {
                queue_id: queue_id.to_string(),
                job_id: job_id.to_string(),
            })
    }

    pub async fn delete_jobs(&self, queue_id: &str, job_ids: &[String]) -> Result<BulkReport> {
        let queue = self.bulk.resolve_queue(queue_id).await?;
        self.bulk.delete_jobs(&queue, job_ids).await
    }

    pub async fn retry_jobs(&self, queue_id: &str, job_ids: &[String]) -> Result<BulkReport> {
        let queue = self.bulk.resolve_queue(queue_id).await?;
        self.bulk.retry_jobs(&queue, job_ids).await
    }

    /// Retries every failed job of the queue; returns how many were moved back.
    pub async fn retry_all_jobs(&self, queue_id: &str, cancel: &CancellationToken) -> Result<u64> {
        let queue = self.bulk.resolve_queue(queue_id).await?;
        self.bulk.retry_all_jobs(&queue, cancel).await
    }

    // ----------------------------
    // Dashboards
    // ----------------------------

    pub async fn build_group_dashboard(&self, group_id: &str) -> Result<GroupDashboard> {
        let group = self
            .repo
            .find_group(group_id)
            .await?
            .ok_or_else(|| QueueError::GroupNotFound(group_id.to_string()))?;
        self.dashboards.build_group_dashboard(group).await
    }

    pub async fn build_all_dashboards(&self) -> Result<Vec<GroupDashboard>> {
        let groups = self.repo.list_groups().await?;
        self.dashboards.build_all_dashboards(groups).await
    }
}
