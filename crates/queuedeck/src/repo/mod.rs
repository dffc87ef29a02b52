use async_trait::async_trait;

use crate::domain::{GroupDescriptor, QueueDescriptor};
use crate::error::Result;

pub mod memory;
pub mod pg;

pub use memory::MemoryDescriptorRepo;
pub use pg::PgDescriptorRepo;

/// Read-only view of the group/queue records kept by the persistence layer.
#[async_trait]
pub trait DescriptorRepository: Send + Sync {
    async fn find_queue(&self, id: &str) -> Result<Option<QueueDescriptor>>;

    /// Queues of a group, in the group's display order.
    async fn find_queues_by_group(&self, group_id: &str) -> Result<Vec<QueueDescriptor>>;

    async fn find_group(&self, id: &str) -> Result<Option<GroupDescriptor>>;

    async fn list_groups(&self) -> Result<Vec<GroupDescriptor>>;
}
