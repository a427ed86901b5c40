use thiserror::Error;

/// Errors returned by the `YouTube` Data API client.
#[derive(Debug, Error)]
pub enum YoutubeError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The daily quota budget is exhausted, either locally (ledger denial)
    /// or upstream (403 `quotaExceeded` / `rateLimitExceeded`).
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The API key was rejected. Permanent; never retried.
    #[error("invalid API credential: {0}")]
    InvalidCredential(String),

    /// 403 for a reason other than quota (e.g. disabled API, blocked key).
    #[error("forbidden: {context}")]
    Forbidden { context: String },

    /// The requested channel/video/playlist does not exist.
    #[error("not found: {context}")]
    NotFound { context: String },

    /// The API returned an error envelope we do not classify more precisely.
    #[error("YouTube API error: {0}")]
    ApiError(String),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl YoutubeError {
    /// Whether this error is quota exhaustion, as opposed to a genuine
    /// failure. Callers use this to decide "retry tomorrow" vs "broken run".
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, YoutubeError::QuotaExceeded(_))
    }
}
