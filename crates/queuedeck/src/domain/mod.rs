pub mod group;
pub mod job;
pub mod page;
pub mod queue;
pub mod report;

pub use group::{GroupDashboard, GroupDescriptor, QueueOutcome};
pub use job::{timestamp_to_date, Job, JobStacktrace, JobState, UnknownJobState};
pub use page::{JobPage, JobWindow};
pub use queue::{EngineKey, JobCounts, NativeCounts, Queue, QueueDescriptor, QueueStatus};
pub use report::{distinct_ids, BulkReport, ExportedJob};
