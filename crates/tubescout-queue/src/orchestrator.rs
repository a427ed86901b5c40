//! Named priority queues with a worker pool per queue.
//!
//! Each queue has an independent concurrency cap, so a burst in one queue
//! cannot starve another. Within a queue, jobs dispatch by ascending priority
//! number with FIFO tie-breaking via a monotone sequence counter. A job whose
//! handler errors is retried on the queue's back-off schedule up to its
//! `max_attempts`, then marked failed and reported, never silently dropped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use tubescout_youtube::RetryPolicy;

use crate::error::QueueError;
use crate::job::{Job, JobId, JobOptions, JobState};

/// The queue names used by the application.
pub mod queues {
    pub const ANALYSIS: &str = "analysis";
    pub const BATCH: &str = "batch";
    pub const SCHEDULED: &str = "scheduled";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const CLEANUP: &str = "cleanup";

    pub const ALL: [&str; 5] = [ANALYSIS, BATCH, SCHEDULED, NOTIFICATIONS, CLEANUP];
}

/// Per-queue tuning.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub concurrency: usize,
    /// Back-off schedule between failed attempts of one job. Attempt
    /// budgets come from each job's `max_attempts`, not from this policy.
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            retry: RetryPolicy::api(),
        }
    }
}

/// Work executed for one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: JobContext) -> anyhow::Result<()>;
}

/// Handler-side view of a running job.
pub struct JobContext {
    pub job_id: JobId,
    pub job_type: String,
    pub payload: Value,
    /// 1-based attempt number of this run.
    pub attempt: u32,
    inner: Arc<Inner>,
}

impl JobContext {
    /// Report progress (0–100). Monotonic per job; also refreshes the
    /// last-activity timestamp used for stall detection.
    pub fn update_progress(&self, percent: u8) {
        self.inner.update_progress(self.job_id, percent);
    }

    /// Whether cancellation was requested while this job is active. Handlers
    /// check this cooperatively at convenient points.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner
            .with_record(self.job_id, |record| record.cancel_requested)
            .unwrap_or(true)
    }
}

/// Caller-side handle returned by `enqueue`.
pub struct JobHandle {
    id: JobId,
    state_rx: watch::Receiver<JobState>,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("state", &*self.state_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl JobHandle {
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn progress(&self) -> u8 {
        self.inner
            .with_record(self.id, |record| record.job.progress)
            .unwrap_or(0)
    }

    /// Wait until the job reaches a terminal state and return it.
    pub async fn wait_until_finished(&mut self) -> JobState {
        loop {
            let state = *self.state_rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if self.state_rx.changed().await.is_err() {
                return *self.state_rx.borrow();
            }
        }
    }
}

/// One job to submit via `enqueue_bulk`.
pub struct BulkJob {
    pub job_type: String,
    pub payload: Value,
    pub options: JobOptions,
}

// Heap entry ordered so the smallest (priority, seq) pair pops first.
#[derive(Debug, PartialEq, Eq)]
struct ReadyEntry {
    priority: i64,
    seq: u64,
    id: JobId,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct QueueState {
    name: String,
    config: QueueConfig,
    ready: Mutex<BinaryHeap<ReadyEntry>>,
    notify: Notify,
}

struct JobRecord {
    job: Job,
    state_tx: watch::Sender<JobState>,
    cancel_requested: bool,
    /// Incremented every time the job goes `Active`; lets a finishing worker
    /// detect that a stall sweep already reassigned the job.
    epoch: u64,
}

struct Inner {
    queues: HashMap<String, Arc<QueueState>>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    seq: AtomicU64,
    shutting_down: AtomicBool,
}

impl Inner {
    fn with_record<T>(&self, id: JobId, f: impl FnOnce(&JobRecord) -> T) -> Option<T> {
        self.jobs.lock().expect("job table lock poisoned").get(&id).map(f)
    }

    fn update_progress(&self, id: JobId, percent: u8) {
        let mut jobs = self.jobs.lock().expect("job table lock poisoned");
        if let Some(record) = jobs.get_mut(&id) {
            record.job.progress = record.job.progress.max(percent.min(100));
            record.job.last_activity_at = Utc::now();
        }
    }

    fn push_ready(&self, queue: &QueueState, id: JobId, priority: i64) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::SeqCst);
        queue
            .ready
            .lock()
            .expect("ready heap lock poisoned")
            .push(ReadyEntry { priority, seq, id });
        queue.notify.notify_one();
    }

    /// Pop the highest-priority entry whose job is still waiting, skipping
    /// entries whose job was cancelled or reassigned since being queued.
    fn pop_ready(&self, queue: &QueueState) -> Option<JobId> {
        let mut heap = queue.ready.lock().expect("ready heap lock poisoned");
        let jobs = self.jobs.lock().expect("job table lock poisoned");
        while let Some(entry) = heap.pop() {
            match jobs.get(&entry.id) {
                Some(record) if record.job.state == JobState::Waiting => return Some(entry.id),
                _ => {}
            }
        }
        None
    }
}

pub struct OrchestratorBuilder {
    queues: HashMap<String, QueueConfig>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn queue(mut self, name: &str, config: QueueConfig) -> Self {
        self.queues.insert(name.to_string(), config);
        self
    }

    #[must_use]
    pub fn build(self) -> JobQueueOrchestrator {
        let queues = self
            .queues
            .into_iter()
            .map(|(name, config)| {
                let state = Arc::new(QueueState {
                    name: name.clone(),
                    config,
                    ready: Mutex::new(BinaryHeap::new()),
                    notify: Notify::new(),
                });
                (name, state)
            })
            .collect();
        JobQueueOrchestrator {
            inner: Arc::new(Inner {
                queues,
                handlers: RwLock::new(HashMap::new()),
                jobs: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }
}

pub struct JobQueueOrchestrator {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueueOrchestrator {
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder {
            queues: HashMap::new(),
        }
    }

    /// All five application queues with the same concurrency cap.
    #[must_use]
    pub fn standard(concurrency: usize) -> Self {
        let mut builder = Self::builder();
        for name in queues::ALL {
            builder = builder.queue(
                name,
                QueueConfig {
                    concurrency,
                    ..QueueConfig::default()
                },
            );
        }
        builder.build()
    }

    pub fn register_handler(&self, job_type: &str, handler: Arc<dyn JobHandler>) {
        self.inner
            .handlers
            .write()
            .expect("handler registry lock poisoned")
            .insert(job_type.to_string(), handler);
    }

    /// Spawn the worker tasks. Must run inside a tokio runtime.
    pub fn start(&self) {
        let mut workers = self.workers.lock().expect("worker list lock poisoned");
        for queue in self.inner.queues.values() {
            for worker_idx in 0..queue.config.concurrency.max(1) {
                let inner = Arc::clone(&self.inner);
                let queue = Arc::clone(queue);
                workers.push(tokio::spawn(worker_loop(inner, queue, worker_idx)));
            }
        }
    }

    /// Stop dispatching and wait for in-flight jobs to finish.
    pub async fn shutdown(&self) {
        self.inner
            .shutting_down
            .store(true, AtomicOrdering::SeqCst);
        for queue in self.inner.queues.values() {
            queue.notify.notify_waiters();
            for _ in 0..queue.config.concurrency {
                queue.notify.notify_one();
            }
        }
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker list lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Submit one job.
    ///
    /// # Errors
    ///
    /// [`QueueError::UnknownQueue`] / [`QueueError::UnknownJobType`] when the
    /// target queue or handler does not exist.
    pub fn enqueue(
        &self,
        queue: &str,
        job_type: &str,
        payload: Value,
        options: JobOptions,
    ) -> Result<JobHandle, QueueError> {
        let queue_state = self
            .inner
            .queues
            .get(queue)
            .ok_or_else(|| QueueError::UnknownQueue(queue.to_string()))?;
        if !self
            .inner
            .handlers
            .read()
            .expect("handler registry lock poisoned")
            .contains_key(job_type)
        {
            return Err(QueueError::UnknownJobType(job_type.to_string()));
        }

        let job = Job::new(queue, job_type, payload, options);
        let id = job.id;
        let priority = job.priority;
        let (state_tx, state_rx) = watch::channel(JobState::Waiting);
        self.inner
            .jobs
            .lock()
            .expect("job table lock poisoned")
            .insert(
                id,
                JobRecord {
                    job,
                    state_tx,
                    cancel_requested: false,
                    epoch: 0,
                },
            );
        self.inner.push_ready(queue_state, id, priority);
        tracing::debug!(job_id = %id, queue, job_type, priority, "job enqueued");
        Ok(JobHandle {
            id,
            state_rx,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Submit many jobs to one queue. Failures are reported per job; one bad
    /// entry does not reject its siblings.
    pub fn enqueue_bulk(
        &self,
        queue: &str,
        jobs: Vec<BulkJob>,
    ) -> Vec<Result<JobHandle, QueueError>> {
        jobs.into_iter()
            .map(|bulk| self.enqueue(queue, &bulk.job_type, bulk.payload, bulk.options))
            .collect()
    }

    /// Cancel a job. Waiting/delayed jobs are cancelled immediately; an
    /// active job gets a cooperative cancellation request and keeps its
    /// eventual outcome otherwise.
    ///
    /// # Errors
    ///
    /// [`QueueError::JobNotFound`] for an unknown id.
    pub fn cancel(&self, id: JobId) -> Result<(), QueueError> {
        let mut jobs = self.inner.jobs.lock().expect("job table lock poisoned");
        let record = jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        match record.job.state {
            JobState::Waiting | JobState::Delayed => {
                record.job.state = JobState::Cancelled;
                record.job.last_activity_at = Utc::now();
                let _ = record.state_tx.send(JobState::Cancelled);
                tracing::info!(job_id = %id, "job cancelled");
            }
            JobState::Active => {
                record.cancel_requested = true;
                tracing::info!(job_id = %id, "cancellation requested for active job");
            }
            _ => {}
        }
        Ok(())
    }

    /// Snapshot of one job's current record.
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.inner.with_record(id, |record| record.job.clone())
    }

    /// Remove terminal job records whose last activity is older than
    /// `older_than`, so a long-running worker does not accumulate one record
    /// per finished job forever. Returns the number of records removed.
    /// Existing [`JobHandle`]s keep reporting the final state through their
    /// watch channel; only the orchestrator-side bookkeeping is dropped.
    pub fn remove_terminal(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::days(1));
        let mut jobs = self.inner.jobs.lock().expect("job table lock poisoned");
        let before = jobs.len();
        jobs.retain(|_, record| {
            !record.job.state.is_terminal() || record.job.last_activity_at > cutoff
        });
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::info!(removed, "terminal job records removed");
        }
        removed
    }

    /// Requeue or fail jobs that have been `Active` with no progress for at
    /// least `idle_for`. Quota already spent by a stalled job stays spent;
    /// only the job bookkeeping is touched. Returns the number of jobs swept.
    pub fn requeue_stalled(&self, idle_for: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(idle_for).unwrap_or_else(|_| chrono::Duration::days(1));
        let mut swept = Vec::new();
        {
            let mut jobs = self.inner.jobs.lock().expect("job table lock poisoned");
            for record in jobs.values_mut() {
                if record.job.state != JobState::Active || record.job.last_activity_at > cutoff {
                    continue;
                }
                if record.job.attempts < record.job.max_attempts {
                    record.job.state = JobState::Waiting;
                    record.job.last_activity_at = Utc::now();
                    let _ = record.state_tx.send(JobState::Waiting);
                    swept.push((record.job.queue.clone(), record.job.id, record.job.priority, true));
                } else {
                    record.job.state = JobState::Failed;
                    record.job.error = Some("stalled: no progress within the allowed window".to_string());
                    record.job.last_activity_at = Utc::now();
                    let _ = record.state_tx.send(JobState::Failed);
                    swept.push((record.job.queue.clone(), record.job.id, record.job.priority, false));
                }
            }
        }
        for (queue_name, id, priority, requeued) in &swept {
            if *requeued {
                if let Some(queue) = self.inner.queues.get(queue_name) {
                    self.inner.push_ready(queue, *id, *priority);
                }
                tracing::warn!(job_id = %id, queue = %queue_name, "stalled job requeued");
            } else {
                tracing::error!(job_id = %id, queue = %queue_name, "stalled job failed; attempts exhausted");
            }
        }
        swept.len()
    }
}

async fn worker_loop(inner: Arc<Inner>, queue: Arc<QueueState>, worker_idx: usize) {
    tracing::debug!(queue = %queue.name, worker_idx, "worker started");
    loop {
        if inner.shutting_down.load(AtomicOrdering::SeqCst) {
            break;
        }
        if let Some(id) = inner.pop_ready(&queue) {
            process_job(&inner, &queue, id).await;
            continue;
        }
        let wakeup = queue.notify.notified();
        if inner.shutting_down.load(AtomicOrdering::SeqCst) {
            break;
        }
        wakeup.await;
    }
    tracing::debug!(queue = %queue.name, worker_idx, "worker stopped");
}

async fn process_job(inner: &Arc<Inner>, queue: &Arc<QueueState>, id: JobId) {
    // Claim the job.
    let claim = {
        let mut jobs = inner.jobs.lock().expect("job table lock poisoned");
        let Some(record) = jobs.get_mut(&id) else {
            return;
        };
        if record.job.state != JobState::Waiting {
            return;
        }
        record.job.state = JobState::Active;
        record.job.attempts += 1;
        record.job.last_activity_at = Utc::now();
        record.epoch += 1;
        let _ = record.state_tx.send(JobState::Active);
        (
            record.job.job_type.clone(),
            record.job.payload.clone(),
            record.job.attempts,
            record.job.max_attempts,
            record.epoch,
        )
    };
    let (job_type, payload, attempt, max_attempts, epoch) = claim;

    let handler = inner
        .handlers
        .read()
        .expect("handler registry lock poisoned")
        .get(&job_type)
        .cloned();
    let Some(handler) = handler else {
        // Registry entries are checked at enqueue time; losing one mid-flight
        // still must not wedge the job in Active.
        settle(inner, id, epoch, JobState::Failed, Some("handler disappeared".to_string()));
        return;
    };

    tracing::debug!(job_id = %id, queue = %queue.name, job_type, attempt, "job started");
    let outcome = handler
        .handle(JobContext {
            job_id: id,
            job_type: job_type.clone(),
            payload,
            attempt,
            inner: Arc::clone(inner),
        })
        .await;

    match outcome {
        Ok(()) => {
            settle(inner, id, epoch, JobState::Completed, None);
            tracing::debug!(job_id = %id, queue = %queue.name, "job completed");
        }
        Err(error) => {
            let message = format!("{error:#}");
            if attempt < max_attempts {
                if mark_delayed(inner, id, epoch, &message) {
                    let delay = queue.config.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        job_id = %id,
                        queue = %queue.name,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %message,
                        "job attempt failed; retrying after back-off"
                    );
                    let inner = Arc::clone(inner);
                    let queue = Arc::clone(queue);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        requeue_delayed(&inner, &queue, id);
                    });
                }
            } else {
                settle(inner, id, epoch, JobState::Failed, Some(message.clone()));
                tracing::error!(
                    job_id = %id,
                    queue = %queue.name,
                    attempts = attempt,
                    error = %message,
                    "job failed; attempts exhausted"
                );
            }
        }
    }
}

/// Apply a terminal state, unless a stall sweep or cancellation already moved
/// the job on since this worker claimed it.
fn settle(inner: &Inner, id: JobId, epoch: u64, state: JobState, error: Option<String>) {
    let mut jobs = inner.jobs.lock().expect("job table lock poisoned");
    let Some(record) = jobs.get_mut(&id) else {
        return;
    };
    if record.job.state != JobState::Active || record.epoch != epoch {
        tracing::debug!(job_id = %id, "stale worker result discarded");
        return;
    }
    record.job.state = state;
    record.job.error = error;
    record.job.last_activity_at = Utc::now();
    if state == JobState::Completed {
        record.job.progress = 100;
    }
    let _ = record.state_tx.send(state);
}

fn mark_delayed(inner: &Inner, id: JobId, epoch: u64, error: &str) -> bool {
    let mut jobs = inner.jobs.lock().expect("job table lock poisoned");
    let Some(record) = jobs.get_mut(&id) else {
        return false;
    };
    if record.job.state != JobState::Active || record.epoch != epoch {
        return false;
    }
    if record.cancel_requested {
        record.job.state = JobState::Cancelled;
        record.job.last_activity_at = Utc::now();
        let _ = record.state_tx.send(JobState::Cancelled);
        return false;
    }
    record.job.state = JobState::Delayed;
    record.job.error = Some(error.to_string());
    record.job.last_activity_at = Utc::now();
    let _ = record.state_tx.send(JobState::Delayed);
    true
}

fn requeue_delayed(inner: &Arc<Inner>, queue: &Arc<QueueState>, id: JobId) {
    let priority = {
        let mut jobs = inner.jobs.lock().expect("job table lock poisoned");
        let Some(record) = jobs.get_mut(&id) else {
            return;
        };
        if record.job.state != JobState::Delayed {
            // Cancelled while waiting out the back-off.
            return;
        }
        record.job.state = JobState::Waiting;
        record.job.last_activity_at = Utc::now();
        let _ = record.state_tx.send(JobState::Waiting);
        record.job.priority
    };
    inner.push_ready(queue, id, priority);
}
