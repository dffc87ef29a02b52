use serde::Serialize;

use crate::domain::Job;

/// One page of a state's job list plus the size of the whole list.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: u64,
}

/// Inclusive index range inside one state's ordered job list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobWindow {
    pub start: u64,
    pub end: u64,
}

impl JobWindow {
    /// Translates 1-based `page`/`size` into `[start, end]`. Values below 1 are treated as 1.
    pub fn from_page(page: u64, size: u64) -> Self {
        let page = page.max(1);
        let size = size.max(1);
        let start = (page - 1).saturating_mul(size);
        let end = start.saturating_add(size - 1);
        Self { start, end }
    }
}
