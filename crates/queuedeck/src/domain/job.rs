use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The six mutually exclusive categories a job can be in, read live from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Paused,
    Active,
    Delayed,
    Failed,
    Completed,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Waiting,
        JobState::Paused,
        JobState::Active,
        JobState::Delayed,
        JobState::Failed,
        JobState::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Paused => "paused",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Failed => "failed",
            JobState::Completed => "completed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownJobState(pub String);

impl fmt::Display for UnknownJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job state: {}", self.0)
    }
}

impl std::error::Error for UnknownJobState {}

impl FromStr for JobState {
    type Err = UnknownJobState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "waiting" | "wait" => Ok(JobState::Waiting),
            "paused" => Ok(JobState::Paused),
            "active" => Ok(JobState::Active),
            "delayed" => Ok(JobState::Delayed),
            "failed" => Ok(JobState::Failed),
            "completed" => Ok(JobState::Completed),
            other => Err(UnknownJobState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStacktrace {
    pub order: usize,
    pub content: String,
}

impl JobStacktrace {
    /// Numbers each line by its position. `None` stays `None`.
    pub fn format(lines: Option<Vec<String>>) -> Option<Vec<JobStacktrace>> {
        lines.map(|lines| {
            lines
                .into_iter()
                .enumerate()
                .map(|(order, content)| JobStacktrace { order, content })
                .collect()
        })
    }
}

/// A job as shown to operators.
///
/// List views leave `data` and `stacktrace` empty; only a single-job read fills them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub attempts_made: u32,
    pub timestamp: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// `None` when the engine holds the record but it sits in no state set
    /// (a job caught mid-transition).
    pub state: Option<JobState>,
    pub failed_reason: Option<String>,
    pub stacktrace: Option<Vec<JobStacktrace>>,
}

/// Engine timestamps are epoch milliseconds; zero or missing means "never".
pub fn timestamp_to_date(millis: Option<i64>) -> Option<DateTime<Utc>> {
    match millis {
        Some(ms) if ms > 0 => DateTime::<Utc>::from_timestamp_millis(ms),
        _ => None,
    }
}
