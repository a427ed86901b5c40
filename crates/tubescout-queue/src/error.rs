use thiserror::Error;

use crate::job::JobId;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown queue '{0}'")]
    UnknownQueue(String),

    /// No handler is registered for this job type; caught at enqueue time so
    /// bulk submissions report it per job.
    #[error("no handler registered for job type '{0}'")]
    UnknownJobType(String),

    #[error("job {0} not found")]
    JobNotFound(JobId),
}
