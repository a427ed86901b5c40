//! Named priority job queues with worker pools, retry, bulk submission,
//! cancellation, and stalled-job recovery.

pub mod error;
pub mod job;
pub mod orchestrator;

pub use error::QueueError;
pub use job::{Job, JobId, JobOptions, JobState};
pub use orchestrator::{
    queues, BulkJob, JobContext, JobHandle, JobHandler, JobQueueOrchestrator, OrchestratorBuilder,
    QueueConfig,
};
