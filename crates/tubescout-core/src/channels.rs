use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered or configured video-publishing channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Upstream channel id (e.g. `UC...`).
    pub id: String,
    pub title: String,
    pub subscriber_count: u64,
    pub video_count: u64,
    pub country: Option<String>,
    pub category: Option<String>,
    pub is_family_safe: bool,
    /// Uploads playlist id, used to page through the channel's videos.
    pub uploads_playlist_id: Option<String>,
    /// When this record was fetched from the upstream API.
    pub fetched_at: DateTime<Utc>,
}

/// Admission criteria for channels entering the per-channel fan-out.
#[derive(Debug, Clone, Copy)]
pub struct FilterCriteria {
    pub min_subscribers: u64,
    pub max_subscribers: u64,
    pub min_videos: u64,
    pub require_family_safe: bool,
}

impl Channel {
    /// Whether this channel qualifies for analysis under `criteria`.
    #[must_use]
    pub fn qualifies(&self, criteria: &FilterCriteria) -> bool {
        if self.subscriber_count < criteria.min_subscribers
            || self.subscriber_count > criteria.max_subscribers
        {
            return false;
        }
        if self.video_count < criteria.min_videos {
            return false;
        }
        if criteria.require_family_safe && !self.is_family_safe {
            return false;
        }
        true
    }
}
