//! Cron-driven maintenance schedule.
//!
//! Each tick enqueues a maintenance job rather than doing the work inline,
//! so recurring work flows through the same queues, retry, and stall
//! handling as everything else.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use tubescout_queue::{queues, JobOptions, JobQueueOrchestrator};

use crate::handlers;

/// Builds and starts the maintenance scheduler.
///
/// The returned `JobScheduler` must be kept alive for the cron jobs to
/// keep firing; dropping it stops the schedule.
pub async fn build_scheduler(
    orchestrator: Arc<JobQueueOrchestrator>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    // Every five minutes: sweep jobs that stopped making progress.
    scheduler
        .add(enqueue_on_tick(
            "0 */5 * * * *",
            Arc::clone(&orchestrator),
            queues::SCHEDULED,
            handlers::SWEEP_STALLED,
        )?)
        .await?;

    // Hourly: drop expired cache entries.
    scheduler
        .add(enqueue_on_tick(
            "0 0 * * * *",
            Arc::clone(&orchestrator),
            queues::CLEANUP,
            handlers::PURGE_CACHE,
        )?)
        .await?;

    // Daily at 03:00: archive old terminal analyses.
    scheduler
        .add(enqueue_on_tick(
            "0 0 3 * * *",
            Arc::clone(&orchestrator),
            queues::CLEANUP,
            handlers::ARCHIVE,
        )?)
        .await?;

    // Daily at 04:00: refresh the exclusion list if it is due.
    scheduler
        .add(enqueue_on_tick(
            "0 0 4 * * *",
            Arc::clone(&orchestrator),
            queues::SCHEDULED,
            handlers::REFRESH_EXCLUSIONS,
        )?)
        .await?;

    scheduler.start().await?;
    tracing::info!("maintenance scheduler started");
    Ok(scheduler)
}

fn enqueue_on_tick(
    schedule: &str,
    orchestrator: Arc<JobQueueOrchestrator>,
    queue: &'static str,
    job_type: &'static str,
) -> Result<Job, JobSchedulerError> {
    Job::new_async(schedule, move |_uuid, _lock| {
        let orchestrator = Arc::clone(&orchestrator);
        Box::pin(async move {
            match orchestrator.enqueue(
                queue,
                job_type,
                serde_json::json!({}),
                JobOptions::default(),
            ) {
                Ok(handle) => {
                    tracing::debug!(job_type, job_id = %handle.id(), "scheduled maintenance job");
                }
                Err(e) => {
                    tracing::warn!(job_type, error = %e, "failed to enqueue maintenance job");
                }
            }
        })
    })
}
