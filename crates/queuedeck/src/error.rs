use thiserror::Error;

/// Failures surfaced by the control plane.
///
/// Ids that a bulk operation could not resolve are not errors; they are
/// reported in [`crate::domain::BulkReport::skipped`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Group not found")]
    GroupNotFound(String),

    #[error("Queue not found")]
    QueueNotFound(String),

    #[error("Job not found")]
    JobNotFound { queue_id: String, job_id: String },

    #[error("queue engine unavailable at {endpoint}: {message}")]
    EngineUnavailable { endpoint: String, message: String },

    #[error("descriptor repository error: {0}")]
    Repository(#[from] sqlx::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl QueueError {
    pub fn engine(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::EngineUnavailable {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::GroupNotFound(_) | Self::QueueNotFound(_) | Self::JobNotFound { .. }
        )
    }
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;
