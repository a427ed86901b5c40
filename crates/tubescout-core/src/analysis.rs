use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_config::AppConfig;
use crate::channels::FilterCriteria;

pub type AnalysisId = Uuid;

/// Analysis lifecycle. `Pending → Processing → {Completed, Failed, Cancelled}`;
/// the three right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl AnalysisStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AnalysisStatus::Completed | AnalysisStatus::Failed | AnalysisStatus::Cancelled
        )
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
            AnalysisStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Per-analysis configuration, supplied at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Competitor channels whose recent uploads seed the exclusion list.
    pub exclusion_channel_ids: Vec<String>,
    /// Search queries used to discover candidate channels.
    pub search_queries: Vec<String>,
    pub min_subscribers: u64,
    pub max_subscribers: u64,
    pub min_videos: u64,
    pub require_family_safe: bool,
    pub time_window_days: i64,
    pub outlier_threshold: f64,
    pub brand_fit_minimum: f64,
    pub max_results: usize,
    pub batch_size: usize,
}

impl AnalysisConfig {
    /// Build a per-analysis config from the process defaults plus the two
    /// request-specific inputs.
    #[must_use]
    pub fn from_app(
        app: &AppConfig,
        exclusion_channel_ids: Vec<String>,
        search_queries: Vec<String>,
    ) -> Self {
        Self {
            exclusion_channel_ids,
            search_queries,
            min_subscribers: app.min_subscribers,
            max_subscribers: app.max_subscribers,
            min_videos: app.min_videos,
            require_family_safe: app.require_family_safe,
            time_window_days: app.time_window_days,
            outlier_threshold: app.outlier_threshold,
            brand_fit_minimum: app.brand_fit_minimum,
            max_results: app.max_results,
            batch_size: app.batch_size,
        }
    }

    #[must_use]
    pub fn filter_criteria(&self) -> FilterCriteria {
        FilterCriteria {
            min_subscribers: self.min_subscribers,
            max_subscribers: self.max_subscribers,
            min_videos: self.min_videos,
            require_family_safe: self.require_family_safe,
        }
    }

    /// Validate caller-supplied values before any work is enqueued.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when a field is out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.search_queries.is_empty() {
            return Err("at least one search query is required".to_string());
        }
        if self.min_subscribers > self.max_subscribers {
            return Err(format!(
                "min_subscribers ({}) exceeds max_subscribers ({})",
                self.min_subscribers, self.max_subscribers
            ));
        }
        if self.time_window_days <= 0 {
            return Err("time_window_days must be positive".to_string());
        }
        if !self.outlier_threshold.is_finite() || self.outlier_threshold < 0.0 {
            return Err("outlier_threshold must be a non-negative number".to_string());
        }
        if self.max_results == 0 {
            return Err("max_results must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// One qualifying outlier video, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierResult {
    pub channel_id: String,
    pub channel_title: String,
    pub subscriber_count: u64,
    pub video_id: String,
    pub video_title: String,
    pub view_count: u64,
    pub published_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub outlier_score: f64,
    pub brand_fit_score: f64,
    /// Known game/content term detected in the video, if any.
    pub detected_game: Option<String>,
}

/// Counters summarising a completed analysis.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub channels_scanned: usize,
    pub channels_qualified: usize,
    pub videos_scanned: usize,
    pub videos_excluded: usize,
    pub outliers_found: usize,
}

/// A unit of work requested by a caller, owned by exactly one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: AnalysisId,
    pub status: AnalysisStatus,
    pub config: AnalysisConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub results: Vec<OutlierResult>,
    pub summary: AnalysisSummary,
}

impl Analysis {
    #[must_use]
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: AnalysisStatus::Pending,
            config,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            results: Vec::new(),
            summary: AnalysisSummary::default(),
        }
    }
}
