pub mod events;
pub mod job;
pub mod manager;

pub use events::{EventBus, JobEvent};
pub use job::{validate_url, Job, JobId, JobOptions, JobStatus, OptionOverrides};
pub use manager::{JobHandle, JobRunner, RunnerSummary};
