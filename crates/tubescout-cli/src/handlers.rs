//! Job handlers bound to the queue orchestrator.
//!
//! Job types:
//! - `analysis.run`: execute one analysis through the pipeline.
//! - `maintenance.sweep_stalled`: requeue or fail jobs with no progress.
//! - `maintenance.purge_cache`: drop expired cache entries.
//! - `maintenance.archive`: remove old terminal analyses and job records.
//! - `maintenance.refresh_exclusions`: rebuild the shared exclusion list
//!   from its source channels when its schedule says it is due.

use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use tubescout_analysis::{
    AnalysisPipeline, AnalysisStore, ExclusionIndex, ExclusionList, InMemoryAnalysisStore,
};
use tubescout_core::{AppConfig, KeywordConfig};
use tubescout_queue::{JobContext, JobHandler, JobQueueOrchestrator};
use tubescout_youtube::YoutubeClient;

pub const ANALYSIS_RUN: &str = "analysis.run";
pub const SWEEP_STALLED: &str = "maintenance.sweep_stalled";
pub const PURGE_CACHE: &str = "maintenance.purge_cache";
pub const ARCHIVE: &str = "maintenance.archive";
pub const REFRESH_EXCLUSIONS: &str = "maintenance.refresh_exclusions";

/// Days a terminal analysis is kept before the archive sweep removes it.
const ARCHIVE_AFTER_DAYS: i64 = 30;

/// How long finished job records stay queryable before the archive sweep
/// drops them from the orchestrator.
const JOB_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

pub fn register_all(
    orchestrator: &Arc<JobQueueOrchestrator>,
    pipeline: Arc<AnalysisPipeline>,
    client: Arc<YoutubeClient>,
    store: Arc<InMemoryAnalysisStore>,
    exclusions: Arc<RwLock<ExclusionList>>,
    keywords: KeywordConfig,
    config: &AppConfig,
) {
    orchestrator.register_handler(ANALYSIS_RUN, Arc::new(AnalysisRunHandler { pipeline }));
    orchestrator.register_handler(
        SWEEP_STALLED,
        Arc::new(SweepStalledHandler {
            orchestrator: Arc::downgrade(orchestrator),
            idle_for: Duration::from_secs(config.job_stalled_after_secs),
        }),
    );
    orchestrator.register_handler(
        PURGE_CACHE,
        Arc::new(PurgeCacheHandler {
            client: Arc::clone(&client),
        }),
    );
    orchestrator.register_handler(
        ARCHIVE,
        Arc::new(ArchiveHandler {
            store,
            orchestrator: Arc::downgrade(orchestrator),
        }),
    );
    orchestrator.register_handler(
        REFRESH_EXCLUSIONS,
        Arc::new(RefreshExclusionsHandler {
            client,
            exclusions,
            keywords,
            time_window_days: config.time_window_days,
        }),
    );
}

struct AnalysisRunHandler {
    pipeline: Arc<AnalysisPipeline>,
}

#[async_trait]
impl JobHandler for AnalysisRunHandler {
    async fn handle(&self, ctx: JobContext) -> anyhow::Result<()> {
        let raw = ctx.payload["analysis_id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("payload missing analysis_id"))?;
        let analysis_id: Uuid = raw.parse()?;
        ctx.update_progress(1);
        self.pipeline.run(analysis_id).await?;
        Ok(())
    }
}

/// Holds the orchestrator weakly: the registry lives inside the
/// orchestrator, so a strong reference here would form a cycle.
struct SweepStalledHandler {
    orchestrator: Weak<JobQueueOrchestrator>,
    idle_for: Duration,
}

#[async_trait]
impl JobHandler for SweepStalledHandler {
    async fn handle(&self, _ctx: JobContext) -> anyhow::Result<()> {
        let Some(orchestrator) = self.orchestrator.upgrade() else {
            return Ok(());
        };
        let swept = orchestrator.requeue_stalled(self.idle_for);
        if swept > 0 {
            tracing::info!(swept, "stalled-job sweep finished");
        }
        Ok(())
    }
}

struct PurgeCacheHandler {
    client: Arc<YoutubeClient>,
}

#[async_trait]
impl JobHandler for PurgeCacheHandler {
    async fn handle(&self, _ctx: JobContext) -> anyhow::Result<()> {
        let removed = self.client.cache().purge_expired().await;
        tracing::info!(removed, "cache purge finished");
        Ok(())
    }
}

/// Holds the orchestrator weakly for the same cycle reason as
/// [`SweepStalledHandler`].
struct ArchiveHandler {
    store: Arc<InMemoryAnalysisStore>,
    orchestrator: Weak<JobQueueOrchestrator>,
}

#[async_trait]
impl JobHandler for ArchiveHandler {
    async fn handle(&self, _ctx: JobContext) -> anyhow::Result<()> {
        let cutoff = Utc::now() - chrono::Duration::days(ARCHIVE_AFTER_DAYS);
        let mut removed = 0usize;
        for id in self.store.terminal_ids().await {
            let Some(analysis) = self.store.get(id).await? else {
                continue;
            };
            if analysis.completed_at.is_some_and(|t| t < cutoff) && self.store.remove(id).await {
                removed += 1;
            }
        }

        // The worker also accumulates one record per finished job (the cron
        // schedule alone adds dozens a day); drop the old ones here too.
        let jobs_removed = self
            .orchestrator
            .upgrade()
            .map_or(0, |orchestrator| orchestrator.remove_terminal(JOB_RETENTION));
        tracing::info!(removed, jobs_removed, "archive sweep finished");
        Ok(())
    }
}

struct RefreshExclusionsHandler {
    client: Arc<YoutubeClient>,
    exclusions: Arc<RwLock<ExclusionList>>,
    keywords: KeywordConfig,
    time_window_days: i64,
}

#[async_trait]
impl JobHandler for RefreshExclusionsHandler {
    async fn handle(&self, _ctx: JobContext) -> anyhow::Result<()> {
        let (due, source_channels) = {
            let list = self.exclusions.read().expect("exclusion list lock poisoned");
            (list.due_for_update(Utc::now()), list.source_channels.clone())
        };
        if !due {
            tracing::debug!("exclusion list not due for refresh");
            return Ok(());
        }
        if source_channels.is_empty() {
            tracing::debug!("exclusion list has no source channels; skipping refresh");
            return Ok(());
        }

        let window_start = Utc::now() - chrono::Duration::days(self.time_window_days);
        let mut source_texts = Vec::new();
        for channel_id in &source_channels {
            let videos = self
                .client
                .get_channel_videos(channel_id, 25, Some(window_start))
                .await?;
            for video in videos {
                source_texts.push(video.title);
                source_texts.push(video.description);
            }
        }
        let index = ExclusionIndex::build(&source_texts, &self.keywords.known_games);

        let mut list = self.exclusions.write().expect("exclusion list lock poisoned");
        list.merge(&index, Utc::now());
        tracing::info!(terms = list.items.len(), "exclusion list refreshed");
        Ok(())
    }
}
