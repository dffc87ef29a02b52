use serde::{Deserialize, Serialize};

use crate::domain::{Queue, QueueDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupDescriptor {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Result of describing one queue for a dashboard. A queue whose engine
/// cannot be reached is rendered inline instead of failing the whole view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum QueueOutcome {
    Ok { queue: Queue },
    Error { queue: QueueDescriptor, error: String },
}

impl QueueOutcome {
    pub fn queue_id(&self) -> &str {
        match self {
            QueueOutcome::Ok { queue } => &queue.descriptor.id,
            QueueOutcome::Error { queue, .. } => &queue.id,
        }
    }

    pub fn described(&self) -> Option<&Queue> {
        match self {
            QueueOutcome::Ok { queue } => Some(queue),
            QueueOutcome::Error { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, QueueOutcome::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDashboard {
    pub group: GroupDescriptor,
    pub queues: Vec<QueueOutcome>,
}
