use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide configuration, loaded once at startup from environment
/// variables (see [`crate::config::load_app_config`]).
///
/// Per-analysis knobs (thresholds, subscriber range, time window) are the
/// *defaults* for new analyses; callers may override them per request via
/// [`crate::AnalysisConfig`].
#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub youtube_api_key: String,
    pub youtube_timeout_secs: u64,
    pub quota_daily_limit: u64,
    pub cache_channel_ttl_secs: u64,
    pub cache_videos_ttl_secs: u64,
    pub cache_search_ttl_secs: u64,
    pub upstream_max_attempts: u32,
    pub upstream_base_delay_ms: u64,
    pub outlier_threshold: f64,
    pub brand_fit_minimum: f64,
    pub min_subscribers: u64,
    pub max_subscribers: u64,
    pub min_videos: u64,
    pub require_family_safe: bool,
    pub time_window_days: i64,
    pub max_results: usize,
    pub batch_size: usize,
    pub worker_concurrency: usize,
    pub job_stalled_after_secs: u64,
    pub keywords_path: PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("youtube_api_key", &"[redacted]")
            .field("youtube_timeout_secs", &self.youtube_timeout_secs)
            .field("quota_daily_limit", &self.quota_daily_limit)
            .field("cache_channel_ttl_secs", &self.cache_channel_ttl_secs)
            .field("cache_videos_ttl_secs", &self.cache_videos_ttl_secs)
            .field("cache_search_ttl_secs", &self.cache_search_ttl_secs)
            .field("upstream_max_attempts", &self.upstream_max_attempts)
            .field("upstream_base_delay_ms", &self.upstream_base_delay_ms)
            .field("outlier_threshold", &self.outlier_threshold)
            .field("brand_fit_minimum", &self.brand_fit_minimum)
            .field("min_subscribers", &self.min_subscribers)
            .field("max_subscribers", &self.max_subscribers)
            .field("min_videos", &self.min_videos)
            .field("require_family_safe", &self.require_family_safe)
            .field("time_window_days", &self.time_window_days)
            .field("max_results", &self.max_results)
            .field("batch_size", &self.batch_size)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("job_stalled_after_secs", &self.job_stalled_after_secs)
            .field("keywords_path", &self.keywords_path)
            .finish()
    }
}
