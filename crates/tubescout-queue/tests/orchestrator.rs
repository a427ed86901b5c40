//! Integration tests for the job queue orchestrator.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use tubescout_queue::{
    queues, BulkJob, JobContext, JobHandler, JobOptions, JobQueueOrchestrator, JobState,
    QueueConfig, QueueError,
};
use tubescout_youtube::RetryPolicy;

fn instant_retry() -> RetryPolicy {
    RetryPolicy::api()
        .no_jitter()
        .with_base_delay(Duration::ZERO)
}

fn single_queue(concurrency: usize) -> JobQueueOrchestrator {
    JobQueueOrchestrator::builder()
        .queue(
            queues::ANALYSIS,
            QueueConfig {
                concurrency,
                retry: instant_retry(),
            },
        )
        .build()
}

/// Records the order in which payloads were handled.
struct Recorder {
    seen: Mutex<Vec<i64>>,
}

#[async_trait]
impl JobHandler for Recorder {
    async fn handle(&self, ctx: JobContext) -> anyhow::Result<()> {
        let n = ctx.payload["n"].as_i64().unwrap_or(-1);
        self.seen.lock().unwrap().push(n);
        Ok(())
    }
}

/// Fails until the configured attempt number is reached.
struct FlakyHandler {
    calls: AtomicU32,
    succeed_on: u32,
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn handle(&self, _ctx: JobContext) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < self.succeed_on {
            anyhow::bail!("attempt {call} failed");
        }
        Ok(())
    }
}

struct SleepyHandler {
    naps: AtomicU32,
    nap: Duration,
}

#[async_trait]
impl JobHandler for SleepyHandler {
    async fn handle(&self, _ctx: JobContext) -> anyhow::Result<()> {
        // Only the first run sleeps; a requeued run completes immediately.
        if self.naps.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(self.nap).await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn dispatch_order_is_priority_then_fifo() {
    let orchestrator = single_queue(1);
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });
    orchestrator.register_handler("record", Arc::clone(&recorder) as Arc<dyn JobHandler>);

    // Enqueue before starting so dispatch order is fully determined by the
    // heap, not by submission timing.
    let mut handles = Vec::new();
    for (n, priority) in [(1, 5), (2, 1), (3, 5), (4, 1), (5, 3)] {
        handles.push(
            orchestrator
                .enqueue(
                    queues::ANALYSIS,
                    "record",
                    json!({ "n": n }),
                    JobOptions::default().with_priority(priority),
                )
                .unwrap(),
        );
    }
    orchestrator.start();
    for handle in &mut handles {
        assert_eq!(handle.wait_until_finished().await, JobState::Completed);
    }
    orchestrator.shutdown().await;

    // Priority 1 first (FIFO within), then 3, then the priority-5 pair FIFO.
    assert_eq!(*recorder.seen.lock().unwrap(), vec![2, 4, 5, 1, 3]);
}

#[tokio::test]
async fn failing_job_is_retried_up_to_max_attempts() {
    let orchestrator = single_queue(1);
    orchestrator.register_handler(
        "flaky",
        Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        }),
    );
    orchestrator.start();

    let mut handle = orchestrator
        .enqueue(
            queues::ANALYSIS,
            "flaky",
            json!({}),
            JobOptions::default().with_max_attempts(3),
        )
        .unwrap();
    assert_eq!(handle.wait_until_finished().await, JobState::Completed);

    let job = orchestrator.job(handle.id()).unwrap();
    assert_eq!(job.attempts, 3);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn exhausted_attempts_mark_the_job_failed_with_error() {
    let orchestrator = single_queue(1);
    orchestrator.register_handler(
        "flaky",
        Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            succeed_on: u32::MAX,
        }),
    );
    orchestrator.start();

    let mut handle = orchestrator
        .enqueue(
            queues::ANALYSIS,
            "flaky",
            json!({}),
            JobOptions::default().with_max_attempts(2),
        )
        .unwrap();
    assert_eq!(handle.wait_until_finished().await, JobState::Failed);

    let job = orchestrator.job(handle.id()).unwrap();
    assert_eq!(job.attempts, 2);
    assert!(job.error.unwrap().contains("attempt 2 failed"));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn cancel_waiting_job_before_dispatch() {
    let orchestrator = single_queue(1);
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });
    orchestrator.register_handler("record", Arc::clone(&recorder) as Arc<dyn JobHandler>);

    let mut handle = orchestrator
        .enqueue(queues::ANALYSIS, "record", json!({ "n": 1 }), JobOptions::default())
        .unwrap();
    orchestrator.cancel(handle.id()).unwrap();
    orchestrator.start();

    assert_eq!(handle.wait_until_finished().await, JobState::Cancelled);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        recorder.seen.lock().unwrap().is_empty(),
        "a cancelled job must never reach its handler"
    );
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn bulk_enqueue_reports_outcomes_per_job() {
    let orchestrator = single_queue(1);
    orchestrator.register_handler(
        "record",
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        }),
    );

    let outcomes = orchestrator.enqueue_bulk(
        queues::ANALYSIS,
        vec![
            BulkJob {
                job_type: "record".to_string(),
                payload: json!({ "n": 1 }),
                options: JobOptions::default(),
            },
            BulkJob {
                job_type: "no-such-type".to_string(),
                payload: json!({}),
                options: JobOptions::default(),
            },
            BulkJob {
                job_type: "record".to_string(),
                payload: json!({ "n": 2 }),
                options: JobOptions::default(),
            },
        ],
    );

    assert!(outcomes[0].is_ok());
    assert!(matches!(
        outcomes[1].as_ref().unwrap_err(),
        QueueError::UnknownJobType(t) if t == "no-such-type"
    ));
    assert!(outcomes[2].is_ok(), "one bad entry must not reject siblings");
}

#[tokio::test]
async fn unknown_queue_is_rejected() {
    let orchestrator = single_queue(1);
    orchestrator.register_handler(
        "record",
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        }),
    );
    let err = orchestrator
        .enqueue("no-such-queue", "record", json!({}), JobOptions::default())
        .unwrap_err();
    assert!(matches!(err, QueueError::UnknownQueue(_)));
}

struct ProgressHandler;

#[async_trait]
impl JobHandler for ProgressHandler {
    async fn handle(&self, ctx: JobContext) -> anyhow::Result<()> {
        ctx.update_progress(40);
        ctx.update_progress(30); // must not regress
        ctx.update_progress(80);
        Ok(())
    }
}

#[tokio::test]
async fn progress_is_monotonic_and_completion_sets_hundred() {
    let orchestrator = single_queue(1);
    orchestrator.register_handler("progress", Arc::new(ProgressHandler));
    orchestrator.start();

    let mut handle = orchestrator
        .enqueue(queues::ANALYSIS, "progress", json!({}), JobOptions::default())
        .unwrap();
    assert_eq!(handle.wait_until_finished().await, JobState::Completed);
    assert_eq!(handle.progress(), 100);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn stalled_job_is_requeued_and_completes_on_second_run() {
    let orchestrator = single_queue(2);
    orchestrator.register_handler(
        "sleepy",
        Arc::new(SleepyHandler {
            naps: AtomicU32::new(0),
            nap: Duration::from_millis(500),
        }),
    );
    orchestrator.start();

    let mut handle = orchestrator
        .enqueue(
            queues::ANALYSIS,
            "sleepy",
            json!({}),
            JobOptions::default().with_max_attempts(3),
        )
        .unwrap();

    // Let the first run go active, then sweep it as stalled.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let swept = orchestrator.requeue_stalled(Duration::from_millis(50));
    assert_eq!(swept, 1);

    assert_eq!(handle.wait_until_finished().await, JobState::Completed);
    let job = orchestrator.job(handle.id()).unwrap();
    assert_eq!(job.attempts, 2, "sweep should have produced a second run");
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn stalled_job_with_exhausted_attempts_fails() {
    let orchestrator = single_queue(1);
    orchestrator.register_handler(
        "sleepy",
        Arc::new(SleepyHandler {
            naps: AtomicU32::new(0),
            nap: Duration::from_millis(500),
        }),
    );
    orchestrator.start();

    let mut handle = orchestrator
        .enqueue(
            queues::ANALYSIS,
            "sleepy",
            json!({}),
            JobOptions::default().with_max_attempts(1),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orchestrator.requeue_stalled(Duration::from_millis(50)), 1);

    assert_eq!(handle.wait_until_finished().await, JobState::Failed);
    let job = orchestrator.job(handle.id()).unwrap();
    assert!(job.error.unwrap().contains("stalled"));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn terminal_job_records_are_evicted_by_age() {
    let orchestrator = single_queue(2);
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });
    orchestrator.register_handler("record", Arc::clone(&recorder) as Arc<dyn JobHandler>);
    orchestrator.register_handler(
        "sleepy",
        Arc::new(SleepyHandler {
            naps: AtomicU32::new(0),
            nap: Duration::from_millis(500),
        }),
    );
    orchestrator.start();

    let mut done = orchestrator
        .enqueue(queues::ANALYSIS, "record", json!({ "n": 1 }), JobOptions::default())
        .unwrap();
    assert_eq!(done.wait_until_finished().await, JobState::Completed);
    let busy = orchestrator
        .enqueue(queues::ANALYSIS, "sleepy", json!({}), JobOptions::default())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A generous retention keeps the fresh record around.
    assert_eq!(orchestrator.remove_terminal(Duration::from_secs(3_600)), 0);
    assert!(orchestrator.job(done.id()).is_some());

    assert_eq!(orchestrator.remove_terminal(Duration::ZERO), 1);
    assert!(orchestrator.job(done.id()).is_none(), "aged-out terminal record must be evicted");
    assert!(
        orchestrator.job(busy.id()).is_some(),
        "an active job must survive eviction"
    );
    assert_eq!(
        done.state(),
        JobState::Completed,
        "the handle keeps the final state after eviction"
    );
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn queues_do_not_starve_each_other() {
    let orchestrator = JobQueueOrchestrator::builder()
        .queue(
            queues::ANALYSIS,
            QueueConfig {
                concurrency: 1,
                retry: instant_retry(),
            },
        )
        .queue(
            queues::CLEANUP,
            QueueConfig {
                concurrency: 1,
                retry: instant_retry(),
            },
        )
        .build();
    orchestrator.register_handler(
        "sleepy",
        Arc::new(SleepyHandler {
            naps: AtomicU32::new(0),
            nap: Duration::from_millis(300),
        }),
    );
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });
    orchestrator.register_handler("record", Arc::clone(&recorder) as Arc<dyn JobHandler>);
    orchestrator.start();

    // Saturate the analysis queue, then submit to cleanup.
    let _busy = orchestrator
        .enqueue(queues::ANALYSIS, "sleepy", json!({}), JobOptions::default())
        .unwrap();
    let mut quick = orchestrator
        .enqueue(queues::CLEANUP, "record", json!({ "n": 9 }), JobOptions::default())
        .unwrap();

    let finished = tokio::time::timeout(Duration::from_millis(200), quick.wait_until_finished())
        .await
        .expect("cleanup queue must not wait behind the analysis queue");
    assert_eq!(finished, JobState::Completed);
    orchestrator.shutdown().await;
}
