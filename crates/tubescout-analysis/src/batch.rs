//! Concurrency-bounded fan-out over large item sets.
//!
//! Items are split into sequential batches of `batch_size`; everything
//! within a batch runs concurrently and the whole batch is awaited before
//! the next one starts. One item's failure is captured, never thrown, so a
//! single bad channel cannot abort its siblings or later batches.

use std::fmt::Display;
use std::future::Future;

use futures::future::join_all;

/// Progress snapshot handed to the per-batch callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
}

impl BatchProgress {
    /// Completion as a 0–100 percentage (100 for an empty input set).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed as f64 / self.total as f64) * 100.0).round() as u8
    }
}

/// One captured item failure.
#[derive(Debug)]
pub struct BatchFailure {
    /// Index of the item in the original input order.
    pub index: usize,
    pub error: String,
}

/// Aggregate outcome of a batch run.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    pub results: Vec<R>,
    pub failures: Vec<BatchFailure>,
    /// Items actually attempted; less than the input length only when the
    /// gate stopped the run early.
    pub processed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchProcessor {
    batch_size: usize,
}

impl BatchProcessor {
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Run `worker` over `items` in concurrency-bounded batches.
    ///
    /// `after_batch` is awaited once per completed batch with the running
    /// progress; returning `false` stops the run before the next batch
    /// (used for cancellation), leaving already-collected results intact.
    pub async fn run<T, R, E, F, Fut, G, GFut>(
        &self,
        items: Vec<T>,
        worker: F,
        mut after_batch: G,
    ) -> BatchOutcome<R>
    where
        E: Display,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        G: FnMut(BatchProgress) -> GFut,
        GFut: Future<Output = bool>,
    {
        let total = items.len();
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(total),
            failures: Vec::new(),
            processed: 0,
        };

        let mut batch = Vec::with_capacity(self.batch_size);
        let mut iter = items.into_iter().enumerate().peekable();
        while iter.peek().is_some() {
            batch.clear();
            for _ in 0..self.batch_size {
                match iter.next() {
                    Some(entry) => batch.push(entry),
                    None => break,
                }
            }

            let worker = &worker;
            let settled = join_all(
                batch
                    .drain(..)
                    .map(|(index, item)| async move { (index, worker(item).await) }),
            )
            .await;

            for (index, result) in settled {
                outcome.processed += 1;
                match result {
                    Ok(value) => outcome.results.push(value),
                    Err(error) => {
                        tracing::warn!(index, error = %error, "batch item failed");
                        outcome.failures.push(BatchFailure {
                            index,
                            error: error.to_string(),
                        });
                    }
                }
            }

            let progress = BatchProgress {
                processed: outcome.processed,
                total,
            };
            if !after_batch(progress).await {
                tracing::debug!(
                    processed = progress.processed,
                    total,
                    "batch run stopped early"
                );
                break;
            }
        }
        outcome
    }
}
