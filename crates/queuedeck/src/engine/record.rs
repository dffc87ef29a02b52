use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{timestamp_to_date, Job, JobStacktrace, JobState};

/// A job exactly as the engine stores it. This is also the export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineJob {
    pub id: String,
    pub name: String,
    pub data: Value,
    pub opts: Value,
    pub progress: Value,
    pub delay: i64,
    pub timestamp: i64,
    pub attempts_made: u32,
    pub failed_reason: Option<String>,
    pub stacktrace: Option<Vec<String>>,
    pub returnvalue: Value,
    pub finished_on: Option<i64>,
    pub processed_on: Option<i64>,
}

impl EngineJob {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        data: Value,
        opts: Value,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data,
            opts,
            progress: Value::from(0),
            delay: 0,
            timestamp,
            attempts_made: 0,
            failed_reason: None,
            stacktrace: None,
            returnvalue: Value::Null,
            finished_on: None,
            processed_on: None,
        }
    }

    /// List-view mapping: no payload, no stacktrace.
    pub fn into_summary(self, state: JobState) -> Job {
        Job {
            id: self.id,
            name: self.name,
            data: None,
            attempts_made: self.attempts_made,
            timestamp: Some(self.timestamp),
            created_at: timestamp_to_date(Some(self.timestamp)),
            processed_at: timestamp_to_date(self.processed_on),
            finished_at: timestamp_to_date(self.finished_on),
            state: Some(state),
            failed_reason: None,
            stacktrace: None,
        }
    }

    pub fn into_job(self, state: Option<JobState>) -> Job {
        Job {
            id: self.id,
            name: self.name,
            data: Some(self.data),
            attempts_made: self.attempts_made,
            timestamp: Some(self.timestamp),
            created_at: timestamp_to_date(Some(self.timestamp)),
            processed_at: timestamp_to_date(self.processed_on),
            finished_at: timestamp_to_date(self.finished_on),
            state,
            failed_reason: self.failed_reason.filter(|r| !r.is_empty()),
            stacktrace: JobStacktrace::format(self.stacktrace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_mapping_keeps_payload_and_numbers_stacktrace() {
        let mut record =
            EngineJob::new("j1", "process", json!({"a": 1}), json!({}), 1_700_000_000_000);
        record.processed_on = Some(0);
        record.finished_on = Some(1_700_000_000_500);
        record.failed_reason = Some(String::new());
        record.stacktrace = Some(vec!["boom".into()]);

        let job = record.into_job(Some(JobState::Failed));

        assert_eq!(job.data, Some(json!({"a": 1})));
        assert_eq!(job.processed_at, None);
        assert_eq!(job.finished_at.unwrap().timestamp_millis(), 1_700_000_000_500);
        assert_eq!(job.failed_reason, None);
        assert_eq!(job.stacktrace.unwrap()[0].content, "boom");
    }

    #[test]
    fn summary_drops_payload() {
        let record = EngineJob::new("j1", "process", json!({"a": 1}), json!({}), 1);
        let job = record.into_summary(JobState::Waiting);
        assert_eq!(job.data, None);
        assert_eq!(job.state, Some(JobState::Waiting));
    }
}
