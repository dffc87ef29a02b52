use serde_json::Value;
use std::collections::BTreeSet;

use crate::domain::Job;

pub const REDACTION_MARKER: &str = "{{hidden}}";

/// Top-level payload fields that must never leave the control plane in clear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompliancePattern {
    fields: BTreeSet<String>,
}

impl CompliancePattern {
    /// Parses the stored form: `"token, secret"`. Blank entries are dropped.
    pub fn parse(raw: Option<&str>) -> Self {
        let fields = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        Self { fields }
    }

    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

/// Replaces every matching top-level field of an object payload with the marker.
pub fn redact_payload(pattern: &CompliancePattern, payload: &mut Value) {
    let Some(object) = payload.as_object_mut() else {
        return;
    };

    for field in pattern.fields() {
        if let Some(value) = object.get_mut(field) {
            *value = Value::String(REDACTION_MARKER.to_string());
        }
    }
}

pub fn redact_job(pattern: &CompliancePattern, mut job: Job) -> Job {
    if let Some(payload) = job.data.as_mut() {
        redact_payload(pattern, payload);
    }
    job
}

pub fn redact(pattern: &CompliancePattern, job: Option<Job>) -> Option<Job> {
    if pattern.is_empty() {
        return job;
    }
    job.map(|j| redact_job(pattern, j))
}
