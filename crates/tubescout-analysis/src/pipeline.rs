//! Analysis orchestration.
//!
//! One [`AnalysisPipeline::run`] call drives a single analysis through its
//! stages in strict order: exclusion build → discovery → per-channel fan-out
//! → aggregation → completion. All status changes go through the
//! [`AnalysisStore`]; any stage error marks the analysis failed with the
//! captured message, so a run can never be left in `Processing` indefinitely.
//! Cancellation is checked between stages and between fan-out sub-batches;
//! late sub-batch results for a cancelled analysis are discarded, not merged.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use tubescout_core::{
    Analysis, AnalysisConfig, AnalysisStatus, AnalysisSummary, Channel, KeywordConfig,
    OutlierResult,
};
use tubescout_youtube::{YoutubeClient, YoutubeError};

use crate::batch::BatchProcessor;
use crate::error::AnalysisError;
use crate::exclusion::ExclusionIndex;
use crate::progress::{ProgressReporter, Stage};
use crate::scoring;
use crate::store::AnalysisStore;

/// Recent uploads inspected per channel, both for exclusion-list building
/// and for scoring.
const VIDEOS_PER_CHANNEL: usize = 25;

/// Per-channel fan-out output, merged during aggregation.
struct ChannelScan {
    results: Vec<OutlierResult>,
    videos_scanned: usize,
    videos_excluded: usize,
}

pub struct AnalysisPipeline {
    client: Arc<YoutubeClient>,
    store: Arc<dyn AnalysisStore>,
    reporter: Arc<ProgressReporter>,
    keywords: KeywordConfig,
}

impl AnalysisPipeline {
    #[must_use]
    pub fn new(
        client: Arc<YoutubeClient>,
        store: Arc<dyn AnalysisStore>,
        reporter: Arc<ProgressReporter>,
        keywords: KeywordConfig,
    ) -> Self {
        Self {
            client,
            store,
            reporter,
            keywords,
        }
    }

    #[must_use]
    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Validate and persist a new analysis in `Pending`; returns its id.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::Validation`] for bad config, [`AnalysisError::Store`]
    /// if persistence fails.
    pub async fn submit(&self, config: AnalysisConfig) -> Result<Uuid, AnalysisError> {
        config.validate().map_err(AnalysisError::Validation)?;
        let analysis = Analysis::new(config);
        let id = analysis.id;
        self.store.create(analysis).await?;
        tracing::info!(analysis_id = %id, "analysis submitted");
        Ok(id)
    }

    /// Mark an analysis cancelled; a running pipeline stops at its next
    /// cancellation check and discards late results.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::Store`] if the analysis is unknown or already in a
    /// different terminal state.
    pub async fn cancel(&self, id: Uuid) -> Result<(), AnalysisError> {
        self.store.cancel(id).await?;
        self.reporter.close(id);
        tracing::info!(analysis_id = %id, "analysis cancelled");
        Ok(())
    }

    /// Execute one analysis to a terminal status.
    ///
    /// Returns `Ok` for both completion and cancellation (the stored status
    /// tells them apart).
    ///
    /// # Errors
    ///
    /// Any stage failure is first recorded via `fail` on the store, then
    /// returned to the caller (e.g. for job-level retry accounting).
    pub async fn run(&self, id: Uuid) -> Result<(), AnalysisError> {
        let analysis = self
            .store
            .get(id)
            .await?
            .ok_or(AnalysisError::NotFound(id))?;
        if analysis.status.is_terminal() {
            // Cancelled (or otherwise finished) while waiting in the queue.
            tracing::info!(analysis_id = %id, status = %analysis.status, "analysis already terminal; nothing to run");
            self.reporter.forget(id);
            return Ok(());
        }
        let config = analysis.config;
        self.store
            .update_status(id, AnalysisStatus::Processing)
            .await?;
        tracing::info!(analysis_id = %id, queries = config.search_queries.len(), "analysis started");

        let outcome = match self.execute(id, &config).await {
            Ok((results, summary)) => {
                self.store.complete(id, results, summary).await?;
                self.reporter
                    .emit(id, Stage::Completion, 100, Some("completed".to_string()));
                self.reporter.close(id);
                tracing::info!(
                    analysis_id = %id,
                    outliers = summary.outliers_found,
                    channels = summary.channels_qualified,
                    "analysis completed"
                );
                Ok(())
            }
            Err(AnalysisError::Cancelled(_)) => {
                // Status was already set by cancel(); just stop quietly.
                self.reporter.close(id);
                tracing::info!(analysis_id = %id, "analysis stopped after cancellation");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(store_err) = self.store.fail(id, &message).await {
                    tracing::error!(analysis_id = %id, error = %store_err, "failed to record analysis failure");
                }
                self.reporter.close(id);
                tracing::warn!(analysis_id = %id, error = %message, "analysis failed");
                Err(e)
            }
        };
        // Nothing emits for this id once the run has settled; the reporter
        // can drop its per-id bookkeeping instead of keeping it forever.
        self.reporter.forget(id);
        outcome
    }

    async fn execute(
        &self,
        id: Uuid,
        config: &AnalysisConfig,
    ) -> Result<(Vec<OutlierResult>, AnalysisSummary), AnalysisError> {
        let window_start = Utc::now() - Duration::days(config.time_window_days);

        // Stage 1: build the exclusion index from competitor uploads.
        self.reporter.emit(id, Stage::ExclusionBuild, 0, None);
        let index = Arc::new(self.build_exclusion_index(config, window_start).await?);
        self.ensure_active(id).await?;
        self.reporter.emit(
            id,
            Stage::ExclusionBuild,
            10,
            Some(format!("{} exclusion terms", index.len())),
        );

        // Stage 2: discover candidate channels and apply the filter gate.
        let (channels, channels_scanned) = self.discover_channels(config).await?;
        self.ensure_active(id).await?;
        self.reporter.emit(
            id,
            Stage::Discovery,
            25,
            Some(format!(
                "{} of {channels_scanned} channels qualify",
                channels.len()
            )),
        );

        // Stage 3: per-channel fan-out, bounded by batch size.
        let mut summary = AnalysisSummary {
            channels_scanned,
            channels_qualified: channels.len(),
            ..AnalysisSummary::default()
        };
        let scans = self
            .fan_out(id, config, window_start, Arc::clone(&index), channels)
            .await?;

        // Stage 4: aggregate, sort, truncate.
        let mut results = Vec::new();
        for scan in scans {
            summary.videos_scanned += scan.videos_scanned;
            summary.videos_excluded += scan.videos_excluded;
            results.extend(scan.results);
        }
        results.sort_by(|a, b| {
            b.outlier_score
                .partial_cmp(&a.outlier_score)
                .unwrap_or(Ordering::Equal)
        });
        results.truncate(config.max_results);
        summary.outliers_found = results.len();
        self.ensure_active(id).await?;
        self.reporter.emit(
            id,
            Stage::Aggregation,
            95,
            Some(format!("{} outliers", results.len())),
        );

        Ok((results, summary))
    }

    async fn build_exclusion_index(
        &self,
        config: &AnalysisConfig,
        window_start: DateTime<Utc>,
    ) -> Result<ExclusionIndex, AnalysisError> {
        let mut source_texts = Vec::new();
        for channel_id in &config.exclusion_channel_ids {
            let videos = match self
                .client
                .get_channel_videos(channel_id, VIDEOS_PER_CHANNEL, Some(window_start))
                .await
            {
                Ok(videos) => videos,
                // A vanished competitor channel is not fatal to the run.
                Err(YoutubeError::NotFound { context }) => {
                    tracing::warn!(%channel_id, %context, "exclusion source channel not found");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            for video in videos {
                source_texts.push(video.title);
                source_texts.push(video.description);
            }
        }
        Ok(ExclusionIndex::build(
            &source_texts,
            &self.keywords.known_games,
        ))
    }

    async fn discover_channels(
        &self,
        config: &AnalysisConfig,
    ) -> Result<(Vec<Channel>, usize), AnalysisError> {
        let mut discovered: HashMap<String, Channel> = HashMap::new();
        for query in &config.search_queries {
            let channels = self
                .client
                .search_channels(query, config.max_results)
                .await?;
            for channel in channels {
                discovered.entry(channel.id.clone()).or_insert(channel);
            }
        }
        let channels_scanned = discovered.len();
        let criteria = config.filter_criteria();
        let qualifying: Vec<Channel> = discovered
            .into_values()
            .filter(|c| c.qualifies(&criteria))
            .collect();
        Ok((qualifying, channels_scanned))
    }

    async fn fan_out(
        &self,
        id: Uuid,
        config: &AnalysisConfig,
        window_start: DateTime<Utc>,
        index: Arc<ExclusionIndex>,
        channels: Vec<Channel>,
    ) -> Result<Vec<ChannelScan>, AnalysisError> {
        let processor = BatchProcessor::new(config.batch_size);
        let outcome = processor
            .run(
                channels,
                |channel| {
                    let index = Arc::clone(&index);
                    async move {
                        self.scan_channel(config, window_start, &index, channel)
                            .await
                    }
                },
                |progress| async move {
                    // Map fan-out progress into the 25–85 band and stop as
                    // soon as the analysis leaves Processing.
                    let percent = 25 + (u32::from(progress.percent()) * 60 / 100) as u8;
                    self.reporter.emit(
                        id,
                        Stage::FanOut,
                        percent,
                        Some(format!("{}/{} channels", progress.processed, progress.total)),
                    );
                    matches!(
                        self.store.status(id).await,
                        Ok(Some(AnalysisStatus::Processing))
                    )
                },
            )
            .await;

        // The gate stops the run when the analysis is no longer active; the
        // collected partial results are then discarded.
        self.ensure_active(id).await?;

        for failure in &outcome.failures {
            tracing::warn!(
                analysis_id = %id,
                index = failure.index,
                error = %failure.error,
                "channel scan failed; continuing without it"
            );
        }
        Ok(outcome.results)
    }

    async fn scan_channel(
        &self,
        config: &AnalysisConfig,
        window_start: DateTime<Utc>,
        index: &ExclusionIndex,
        channel: Channel,
    ) -> Result<ChannelScan, YoutubeError> {
        let videos = self
            .client
            .get_channel_videos(&channel.id, VIDEOS_PER_CHANNEL, Some(window_start))
            .await?;

        let mut scan = ChannelScan {
            results: Vec::new(),
            videos_scanned: videos.len(),
            videos_excluded: 0,
        };
        for video in videos {
            let text = format!("{} {}", video.title, video.description).to_lowercase();
            let matched = index.matches(&text);
            let detected_game = self
                .keywords
                .known_games
                .iter()
                .find(|game| text.contains(game.as_str()))
                .cloned();
            if matched.excluded {
                scan.videos_excluded += 1;
            }
            let outlier = scoring::outlier_score(video.view_count, channel.subscriber_count);
            let fit = scoring::brand_fit(
                &video.title,
                &video.description,
                video.duration_seconds,
                &self.keywords,
            );
            if scoring::is_qualifying_outlier(
                outlier,
                fit,
                matched.excluded,
                config.outlier_threshold,
                config.brand_fit_minimum,
            ) {
                scan.results.push(OutlierResult {
                    channel_id: channel.id.clone(),
                    channel_title: channel.title.clone(),
                    subscriber_count: channel.subscriber_count,
                    video_id: video.id,
                    video_title: video.title,
                    view_count: video.view_count,
                    published_at: video.published_at,
                    duration_seconds: video.duration_seconds,
                    outlier_score: outlier,
                    brand_fit_score: fit,
                    detected_game,
                });
            }
        }
        Ok(scan)
    }

    async fn ensure_active(&self, id: Uuid) -> Result<(), AnalysisError> {
        match self.store.status(id).await? {
            Some(AnalysisStatus::Processing) => Ok(()),
            Some(_) => Err(AnalysisError::Cancelled(id)),
            None => Err(AnalysisError::NotFound(id)),
        }
    }
}
