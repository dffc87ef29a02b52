use futures::future::join_all;
use futures::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::warn;

use crate::bulk::{boxed, BulkCoordinator};
use crate::domain::{GroupDashboard, GroupDescriptor, QueueDescriptor, QueueOutcome};
use crate::error::Result;
use crate::repo::DescriptorRepository;

/// Builds live dashboard views out of descriptor records and engine state.
#[derive(Clone)]
pub struct DashboardAggregator {
    repo: Arc<dyn DescriptorRepository>,
    bulk: BulkCoordinator,
    concurrency: usize,
}

impl DashboardAggregator {
    pub fn new(
        repo: Arc<dyn DescriptorRepository>,
        bulk: BulkCoordinator,
        concurrency: usize,
    ) -> Self {
        Self {
            repo,
            bulk,
            concurrency: concurrency.max(1),
        }
    }

    /// Describes `queues` concurrently, in the given order. An engine failure
    /// becomes an inline [`QueueOutcome::Error`] for that queue only.
    pub async fn describe_queues(&self, queues: Vec<QueueDescriptor>) -> Vec<QueueOutcome> {
        join_all(queues.into_iter().map(|queue| async move {
            let described = self
                .bulk
                .with_adapter(&queue, |port| boxed(async move { port.describe().await }))
                .await;

            match described {
                Ok(queue) => QueueOutcome::Ok { queue },
                Err(e) => {
                    warn!(
                        queue = %queue.id,
                        endpoint = %queue.endpoint(),
                        error = %e,
                        "queue unavailable"
                    );
                    QueueOutcome::Error {
                        error: e.to_string(),
                        queue,
                    }
                }
            }
        }))
        .await
    }

    pub async fn build_group_dashboard(&self, group: GroupDescriptor) -> Result<GroupDashboard> {
        let queues = self.repo.find_queues_by_group(&group.id).await?;
        let queues = self.describe_queues(queues).await;
        Ok(GroupDashboard { group, queues })
    }

    /// One dashboard per group, at most `concurrency` groups in flight.
    pub async fn build_all_dashboards(
        &self,
        groups: Vec<GroupDescriptor>,
    ) -> Result<Vec<GroupDashboard>> {
        let builds: Vec<_> = groups
            .into_iter()
            .map(|group| self.build_group_dashboard(group))
            .collect();

        stream::iter(builds)
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}
