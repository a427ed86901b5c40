use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub type JobId = Uuid;

/// Job lifecycle. `Waiting → Active → {Completed, Failed, Cancelled}`, with
/// `Delayed` between failed attempts and `Waiting` again after a requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Per-job submission options.
#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    /// Lower number = higher priority; ties dispatch FIFO.
    pub priority: i64,
    /// Total tries, including the first.
    pub max_attempts: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 10,
            max_attempts: 3,
        }
    }
}

impl JobOptions {
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// A unit dispatched to a worker.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_type: String,
    pub payload: Value,
    pub priority: i64,
    /// Tries started so far; never exceeds `max_attempts`.
    pub attempts: u32,
    pub max_attempts: u32,
    pub state: JobState,
    /// 0–100, monotonically non-decreasing; also feeds stall detection.
    pub progress: u8,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Job {
    #[must_use]
    pub fn new(queue: &str, job_type: &str, payload: Value, options: JobOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            queue: queue.to_string(),
            job_type: job_type.to_string(),
            payload,
            priority: options.priority,
            attempts: 0,
            max_attempts: options.max_attempts.max(1),
            state: JobState::Waiting,
            progress: 0,
            error: None,
            created_at: now,
            last_activity_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobState::Waiting.is_terminal());
        assert!(!JobState::Active.is_terminal());
        assert!(!JobState::Delayed.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn max_attempts_floor_is_one() {
        let job = Job::new(
            "analysis",
            "run",
            Value::Null,
            JobOptions::default().with_max_attempts(0),
        );
        assert_eq!(job.max_attempts, 1);
    }
}
