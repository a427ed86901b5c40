use thiserror::Error;
use uuid::Uuid;

use tubescout_youtube::YoutubeError;

use crate::store::StoreError;

/// Errors surfaced by the analysis pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Caller-supplied configuration is invalid; surfaced immediately,
    /// never retried.
    #[error("invalid analysis config: {0}")]
    Validation(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] YoutubeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("analysis {0} not found")]
    NotFound(Uuid),

    /// The analysis was cancelled while running; the run stops contributing
    /// results and the stored status stays `Cancelled`.
    #[error("analysis {0} was cancelled")]
    Cancelled(Uuid),
}

impl AnalysisError {
    /// Quota exhaustion must stay distinguishable from genuine failures so
    /// callers can decide to retry later.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, AnalysisError::Upstream(e) if e.is_quota_exceeded())
    }
}
