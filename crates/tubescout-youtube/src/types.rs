//! Wire types for the `YouTube` Data API v3 JSON responses.
//!
//! Numeric statistics arrive as JSON strings (`"subscriberCount": "12345"`)
//! and are parsed leniently: a missing or malformed count becomes 0 rather
//! than failing the whole response.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use tubescout_core::{Channel, Video};

#[derive(Debug, Deserialize)]
pub struct ChannelListResponse {
    #[serde(default)]
    pub items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelItem {
    pub id: String,
    pub snippet: ChannelSnippet,
    #[serde(default)]
    pub statistics: ChannelStatistics,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<ChannelContentDetails>,
    #[serde(default)]
    pub status: ChannelStatus,
}

#[derive(Debug, Deserialize)]
pub struct ChannelSnippet {
    pub title: String,
    pub country: Option<String>,
    #[serde(rename = "categoryId")]
    pub category_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChannelStatistics {
    #[serde(rename = "subscriberCount", default)]
    pub subscriber_count: String,
    #[serde(rename = "videoCount", default)]
    pub video_count: String,
}

#[derive(Debug, Deserialize)]
pub struct ChannelContentDetails {
    #[serde(rename = "relatedPlaylists")]
    pub related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
pub struct RelatedPlaylists {
    pub uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelStatus {
    #[serde(rename = "isFamilySafe", default = "default_family_safe")]
    pub is_family_safe: bool,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self {
            is_family_safe: true,
        }
    }
}

fn default_family_safe() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchItem {
    pub id: SearchItemId,
}

#[derive(Debug, Deserialize)]
pub struct SearchItemId {
    #[serde(rename = "channelId")]
    pub channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItemsResponse {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    #[serde(rename = "contentDetails")]
    pub content_details: PlaylistItemContentDetails,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItemContentDetails {
    #[serde(rename = "videoId")]
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
pub struct VideoItem {
    pub id: String,
    pub snippet: VideoSnippet,
    #[serde(default)]
    pub statistics: VideoStatistics,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<VideoContentDetails>,
}

#[derive(Debug, Deserialize)]
pub struct VideoSnippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "publishedAt")]
    pub published_at: DateTime<Utc>,
    #[serde(rename = "channelId")]
    pub channel_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoStatistics {
    #[serde(rename = "viewCount", default)]
    pub view_count: String,
    #[serde(rename = "likeCount", default)]
    pub like_count: String,
}

#[derive(Debug, Deserialize)]
pub struct VideoContentDetails {
    #[serde(default)]
    pub duration: String,
}

fn parse_count(raw: &str) -> u64 {
    raw.parse().unwrap_or(0)
}

impl ChannelItem {
    #[must_use]
    pub fn into_channel(self) -> Channel {
        Channel {
            id: self.id,
            title: self.snippet.title,
            subscriber_count: parse_count(&self.statistics.subscriber_count),
            video_count: parse_count(&self.statistics.video_count),
            country: self.snippet.country,
            category: self.snippet.category_id,
            is_family_safe: self.status.is_family_safe,
            uploads_playlist_id: self
                .content_details
                .and_then(|cd| cd.related_playlists.uploads),
            fetched_at: Utc::now(),
        }
    }
}

impl VideoItem {
    #[must_use]
    pub fn into_video(self) -> Video {
        let duration_seconds = self
            .content_details
            .map(|cd| parse_iso8601_duration(&cd.duration))
            .unwrap_or(0);
        Video {
            id: self.id,
            title: self.snippet.title,
            description: self.snippet.description,
            published_at: self.snippet.published_at,
            view_count: parse_count(&self.statistics.view_count),
            like_count: parse_count(&self.statistics.like_count),
            duration_seconds,
            channel_id: self.snippet.channel_id,
        }
    }
}

/// Parse an ISO-8601 duration as produced by the API (`PT1H2M3S`).
///
/// Only the time components the API emits (H/M/S, plus day counts for very
/// long streams) are supported; anything unparseable yields 0.
#[must_use]
pub fn parse_iso8601_duration(raw: &str) -> u64 {
    let Some(rest) = raw.strip_prefix('P') else {
        return 0;
    };
    let mut seconds = 0u64;
    let mut number = 0u64;
    let mut in_time = false;
    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' => {
                number = number
                    .saturating_mul(10)
                    .saturating_add(u64::from(c as u8 - b'0'));
            }
            'D' if !in_time => {
                seconds = seconds.saturating_add(number.saturating_mul(86_400));
                number = 0;
            }
            'H' if in_time => {
                seconds = seconds.saturating_add(number.saturating_mul(3_600));
                number = 0;
            }
            'M' if in_time => {
                seconds = seconds.saturating_add(number.saturating_mul(60));
                number = 0;
            }
            'S' if in_time => {
                seconds = seconds.saturating_add(number);
                number = 0;
            }
            _ => return 0,
        }
    }
    seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_full_hms() {
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), 3_723);
    }

    #[test]
    fn duration_minutes_seconds() {
        assert_eq!(parse_iso8601_duration("PT4M13S"), 253);
    }

    #[test]
    fn duration_seconds_only() {
        assert_eq!(parse_iso8601_duration("PT45S"), 45);
    }

    #[test]
    fn duration_with_days() {
        assert_eq!(parse_iso8601_duration("P1DT2H"), 93_600);
    }

    #[test]
    fn duration_garbage_is_zero() {
        assert_eq!(parse_iso8601_duration(""), 0);
        assert_eq!(parse_iso8601_duration("1H2M"), 0);
        assert_eq!(parse_iso8601_duration("PTXYZ"), 0);
    }

    #[test]
    fn channel_item_parses_string_counts() {
        let json = serde_json::json!({
            "id": "UC1",
            "snippet": { "title": "Chan", "country": "US" },
            "statistics": { "subscriberCount": "12345", "videoCount": "99" },
            "contentDetails": { "relatedPlaylists": { "uploads": "UU1" } }
        });
        let item: ChannelItem = serde_json::from_value(json).unwrap();
        let channel = item.into_channel();
        assert_eq!(channel.subscriber_count, 12_345);
        assert_eq!(channel.video_count, 99);
        assert_eq!(channel.uploads_playlist_id.as_deref(), Some("UU1"));
        assert!(channel.is_family_safe, "family-safe defaults to true");
    }

    #[test]
    fn malformed_count_becomes_zero() {
        let json = serde_json::json!({
            "id": "UC1",
            "snippet": { "title": "Chan" },
            "statistics": { "subscriberCount": "hidden" }
        });
        let item: ChannelItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.into_channel().subscriber_count, 0);
    }

    #[test]
    fn video_item_maps_all_fields() {
        let json = serde_json::json!({
            "id": "vid1",
            "snippet": {
                "title": "FUNNY Moments",
                "description": "desc",
                "publishedAt": "2025-05-01T12:00:00Z",
                "channelId": "UC1"
            },
            "statistics": { "viewCount": "50000", "likeCount": "1200" },
            "contentDetails": { "duration": "PT10M" }
        });
        let item: VideoItem = serde_json::from_value(json).unwrap();
        let video = item.into_video();
        assert_eq!(video.view_count, 50_000);
        assert_eq!(video.like_count, 1_200);
        assert_eq!(video.duration_seconds, 600);
        assert_eq!(video.channel_id, "UC1");
    }
}
