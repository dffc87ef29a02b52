use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::domain::{GroupDescriptor, QueueDescriptor};
use crate::error::Result;
use crate::repo::DescriptorRepository;

/// Descriptor records held in memory, kept in insertion order.
#[derive(Default)]
pub struct MemoryDescriptorRepo {
    inner: Mutex<Records>,
}

#[derive(Default)]
struct Records {
    groups: Vec<GroupDescriptor>,
    queues: Vec<QueueDescriptor>,
}

impl MemoryDescriptorRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_group(&self, group: GroupDescriptor) {
        self.lock().groups.push(group);
    }

    pub fn add_queue(&self, queue: QueueDescriptor) {
        self.lock().queues.push(queue);
    }
}

#[async_trait]
impl DescriptorRepository for MemoryDescriptorRepo {
    async fn find_queue(&self, id: &str) -> Result<Option<QueueDescriptor>> {
        Ok(self.lock().queues.iter().find(|q| q.id == id).cloned())
    }

    async fn find_queues_by_group(&self, group_id: &str) -> Result<Vec<QueueDescriptor>> {
        Ok(self
            .lock()
            .queues
            .iter()
            .filter(|q| q.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn find_group(&self, id: &str) -> Result<Option<GroupDescriptor>> {
        Ok(self.lock().groups.iter().find(|g| g.id == id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupDescriptor>> {
        Ok(self.lock().groups.clone())
    }
}
