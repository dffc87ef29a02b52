use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What a bulk call did. Ids in `skipped` did not resolve (missing queue or
/// job, or a job the engine refused to touch); the call itself still succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

impl BulkReport {
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = (String, bool)>) -> Self {
        let mut report = BulkReport::default();
        for (id, applied) in outcomes {
            if applied {
                report.applied.push(id);
            } else {
                report.skipped.push(id);
            }
        }
        report
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// A job record ready for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedJob {
    pub filename: String,
    pub content: String,
}

impl ExportedJob {
    pub fn filename_for(queue_id: &str, job_id: &str) -> String {
        format!("queue_{queue_id}-job_{job_id}.json")
    }
}

/// Drops repeated ids, keeping first-seen order.
pub fn distinct_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.insert(id.as_str()) {
            out.push(id.clone());
        }
    }
    out
}
