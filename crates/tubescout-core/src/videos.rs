use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate video fetched from a channel's uploads.
///
/// Holds a non-owning reference to its channel (`channel_id`); the channel
/// record may be refreshed or expire from cache independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub view_count: u64,
    pub like_count: u64,
    pub duration_seconds: u64,
    pub channel_id: String,
}

impl Video {
    /// Canonical watch URL for this video.
    #[must_use]
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}
