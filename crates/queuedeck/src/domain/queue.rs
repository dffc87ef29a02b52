use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::JobState;
use crate::error::{QueueError, Result};
use crate::redact::CompliancePattern;

/// Static queue record owned by the descriptor repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QueueDescriptor {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub description: Option<String>,
    /// Comma separated payload field names to hide.
    pub compliance: Option<String>,
    pub group_id: String,
}

impl QueueDescriptor {
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.name)
    }

    pub fn engine_key(&self) -> Result<EngineKey> {
        let port = u16::try_from(self.port)
            .map_err(|_| QueueError::engine(self.endpoint(), "port out of range"))?;

        Ok(EngineKey {
            host: self.host.clone(),
            port,
            name: self.name.clone(),
        })
    }

    pub fn compliance_pattern(&self) -> CompliancePattern {
        CompliancePattern::parse(self.compliance.as_deref())
    }
}

/// Connection identity of one queue inside an engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineKey {
    pub host: String,
    pub port: u16,
    pub name: String,
}

impl fmt::Display for EngineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Running,
    Paused,
}

impl QueueStatus {
    pub fn from_paused(paused: bool) -> Self {
        if paused {
            QueueStatus::Paused
        } else {
            QueueStatus::Running
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Running => "running",
            QueueStatus::Paused => "paused",
        }
    }
}

/// Counts exactly as the engine reports them. `waiting` covers every job
/// awaiting pickup, whichever list the engine parks it in while paused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub failed: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub paused: u64,
    pub active: u64,
    pub delayed: u64,
    pub failed: u64,
    pub completed: u64,
}

impl JobCounts {
    /// A paused queue reports its whole backlog as `paused` and zero `waiting`.
    pub fn reclassify(native: NativeCounts, status: QueueStatus) -> Self {
        let (waiting, paused) = match status {
            QueueStatus::Paused => (0, native.waiting),
            QueueStatus::Running => (native.waiting, 0),
        };

        Self {
            waiting,
            paused,
            active: native.active,
            delayed: native.delayed,
            failed: native.failed,
            completed: native.completed,
        }
    }

    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Waiting => self.waiting,
            JobState::Paused => self.paused,
            JobState::Active => self.active,
            JobState::Delayed => self.delayed,
            JobState::Failed => self.failed,
            JobState::Completed => self.completed,
        }
    }
}

/// A descriptor enriched with live engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    #[serde(flatten)]
    pub descriptor: QueueDescriptor,
    pub status: QueueStatus,
    pub job_counts: JobCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(waiting: u64) -> NativeCounts {
        NativeCounts {
            waiting,
            active: 2,
            delayed: 3,
            failed: 4,
            completed: 5,
        }
    }

    #[test]
    fn paused_queue_moves_backlog_into_paused() {
        let counts = JobCounts::reclassify(native(7), QueueStatus::Paused);
        assert_eq!(counts.waiting, 0);
        assert_eq!(counts.paused, 7);
        assert_eq!(counts.failed, 4);
    }

    #[test]
    fn running_queue_keeps_backlog_waiting() {
        let counts = JobCounts::reclassify(native(7), QueueStatus::Running);
        assert_eq!(counts.waiting, 7);
        assert_eq!(counts.paused, 0);
        assert_eq!(counts.get(JobState::Completed), 5);
    }

    #[test]
    fn engine_key_rejects_bad_ports() {
        let mut queue = QueueDescriptor {
            id: "q1".into(),
            name: "mail".into(),
            host: "localhost".into(),
            port: 6379,
            description: None,
            compliance: None,
            group_id: "g1".into(),
        };
        assert_eq!(queue.engine_key().unwrap().port, 6379);

        queue.port = 70_000;
        assert!(matches!(
            queue.engine_key(),
            Err(QueueError::EngineUnavailable { .. })
        ));
    }
}
