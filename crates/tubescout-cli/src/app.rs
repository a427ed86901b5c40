//! Process wiring: configuration, upstream client, pipeline, queues.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context;

use tubescout_analysis::{
    AnalysisPipeline, ExclusionList, InMemoryAnalysisStore, ProgressReporter,
};
use tubescout_core::{load_app_config, load_keywords, AppConfig, KeywordConfig};
use tubescout_queue::JobQueueOrchestrator;
use tubescout_youtube::{CacheConfig, CachedFetcher, QuotaLedger, RetryPolicy, YoutubeClient};

use crate::handlers;

/// Everything a subcommand needs, constructed once at startup.
pub struct App {
    pub config: AppConfig,
    pub keywords: KeywordConfig,
    pub client: Arc<YoutubeClient>,
    pub store: Arc<InMemoryAnalysisStore>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub orchestrator: Arc<JobQueueOrchestrator>,
    pub exclusions: Arc<RwLock<ExclusionList>>,
}

impl App {
    pub fn build() -> anyhow::Result<App> {
        let config = load_app_config().context("failed to load configuration")?;
        Self::build_with_config(config)
    }

    pub fn build_with_config(config: AppConfig) -> anyhow::Result<App> {
        let keywords = match load_keywords(&config.keywords_path) {
            Ok(keywords) => keywords,
            Err(e) => {
                tracing::warn!(
                    path = %config.keywords_path.display(),
                    error = %e,
                    "keyword config unavailable; using built-in defaults"
                );
                KeywordConfig::default()
            }
        };

        let quota = Arc::new(QuotaLedger::new(config.quota_daily_limit));
        let cache = Arc::new(CachedFetcher::new(CacheConfig {
            channel_ttl: Duration::from_secs(config.cache_channel_ttl_secs),
            videos_ttl: Duration::from_secs(config.cache_videos_ttl_secs),
            search_ttl: Duration::from_secs(config.cache_search_ttl_secs),
        }));
        let retry = RetryPolicy::upstream()
            .with_max_attempts(config.upstream_max_attempts)
            .with_base_delay(Duration::from_millis(config.upstream_base_delay_ms));
        let client = Arc::new(
            YoutubeClient::new(
                &config.youtube_api_key,
                config.youtube_timeout_secs,
                Arc::clone(&quota),
                Arc::clone(&cache),
                retry,
            )
            .context("failed to build YouTube client")?,
        );

        let store = Arc::new(InMemoryAnalysisStore::new());
        let pipeline = Arc::new(AnalysisPipeline::new(
            Arc::clone(&client),
            Arc::clone(&store) as _,
            Arc::new(ProgressReporter::default()),
            keywords.clone(),
        ));

        let exclusions = Arc::new(RwLock::new(ExclusionList::new(Vec::new(), true, 7)));

        let orchestrator = Arc::new(JobQueueOrchestrator::standard(config.worker_concurrency));
        handlers::register_all(
            &orchestrator,
            Arc::clone(&pipeline),
            Arc::clone(&client),
            Arc::clone(&store),
            Arc::clone(&exclusions),
            keywords.clone(),
            &config,
        );

        tracing::info!(
            env = %config.env,
            quota_daily_limit = config.quota_daily_limit,
            worker_concurrency = config.worker_concurrency,
            "application wired"
        );

        Ok(App {
            config,
            keywords,
            client,
            store,
            pipeline,
            orchestrator,
            exclusions,
        })
    }
}
