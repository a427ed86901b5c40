//! HTTP client for the `YouTube` Data API v3.
//!
//! Wraps `reqwest` with typed deserialization, quota accounting, layered
//! caching, and retry. Every physical request reserves its cost units from
//! the [`QuotaLedger`] *before* being sent (quota is spent on attempt, not
//! on success), and every public read goes through the [`CachedFetcher`],
//! so repeated lookups within TTL cost nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};

use tubescout_core::{Channel, Video};

use crate::cache::{CachedFetcher, ResourceKind};
use crate::error::YoutubeError;
use crate::quota::QuotaLedger;
use crate::retry::{upstream_retryable, RetryPolicy};
use crate::types::{
    ChannelItem, ChannelListResponse, PlaylistItemsResponse, SearchListResponse, VideoItem,
    VideoListResponse,
};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";

/// Cost units billed per `search.list` call.
pub const SEARCH_COST: u64 = 100;
/// Cost units billed per `channels.list` / `playlistItems.list` / `videos.list` call.
pub const LIST_COST: u64 = 1;

/// Page size for playlist traversal and batched video lookups.
const PAGE_SIZE: usize = 50;

/// Client for the `YouTube` Data API.
///
/// Use [`YoutubeClient::new`] for production or
/// [`YoutubeClient::with_base_url`] to point at a mock server in tests.
/// The ledger and cache are injected so callers can share one budget across
/// clients or isolate budgets per tenant.
pub struct YoutubeClient {
    http: Client,
    api_key: String,
    base_url: Url,
    quota: Arc<QuotaLedger>,
    cache: Arc<CachedFetcher>,
    retry: RetryPolicy,
}

impl YoutubeClient {
    /// Creates a client pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`YoutubeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        api_key: &str,
        timeout_secs: u64,
        quota: Arc<QuotaLedger>,
        cache: Arc<CachedFetcher>,
        retry: RetryPolicy,
    ) -> Result<Self, YoutubeError> {
        Self::with_base_url(api_key, timeout_secs, quota, cache, retry, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`YoutubeError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`YoutubeError::ApiError`] if `base_url`
    /// is not a valid URL.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        quota: Arc<QuotaLedger>,
        cache: Arc<CachedFetcher>,
        retry: RetryPolicy,
        base_url: &str,
    ) -> Result<Self, YoutubeError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("tubescout/0.1 (outlier-discovery)")
            .build()?;

        // Normalise: ensure the base URL ends with exactly one slash so that
        // resource paths append rather than replace the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| YoutubeError::ApiError(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.to_owned(),
            base_url,
            quota,
            cache,
            retry,
        })
    }

    /// The shared quota ledger, for admission decisions before batch work.
    #[must_use]
    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    #[must_use]
    pub fn cache(&self) -> &CachedFetcher {
        &self.cache
    }

    /// Fetches channel metadata and statistics by channel id.
    ///
    /// Served from cache within the channel-metadata TTL (24 h by default).
    ///
    /// # Errors
    ///
    /// - [`YoutubeError::NotFound`] if no channel matches `channel_id`.
    /// - [`YoutubeError::QuotaExceeded`] if the daily budget is exhausted.
    /// - [`YoutubeError::Http`] / [`YoutubeError::Deserialize`] on transport
    ///   or response-shape failures.
    pub async fn get_channel(&self, channel_id: &str) -> Result<Channel, YoutubeError> {
        self.cache
            .fetch(ResourceKind::ChannelMetadata, channel_id, || async move {
                let url = self.build_url(
                    "channels",
                    &[
                        ("part", "snippet,contentDetails,statistics,status"),
                        ("id", channel_id),
                    ],
                );
                let body = self.request(LIST_COST, "channels.list", &url).await?;
                let response: ChannelListResponse = decode(body, "channels.list")?;
                response
                    .items
                    .into_iter()
                    .next()
                    .map(ChannelItem::into_channel)
                    .ok_or_else(|| YoutubeError::NotFound {
                        context: format!("channel {channel_id}"),
                    })
            })
            .await
    }

    /// Searches for channels matching `query`, resolving full statistics for
    /// each hit. Capped at one search page (50 results).
    ///
    /// # Errors
    ///
    /// Same classes as [`YoutubeClient::get_channel`]; an empty result set
    /// is `Ok(vec![])`, not an error.
    pub async fn search_channels(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Channel>, YoutubeError> {
        let capped = max_results.min(PAGE_SIZE);
        let key = format!("channels:{query}:{capped}");
        self.cache
            .fetch(ResourceKind::Search, &key, || async move {
                let max_str = capped.to_string();
                let url = self.build_url(
                    "search",
                    &[
                        ("part", "snippet"),
                        ("q", query),
                        ("type", "channel"),
                        ("maxResults", &max_str),
                    ],
                );
                let body = self.request(SEARCH_COST, "search.list", &url).await?;
                let response: SearchListResponse = decode(body, "search.list")?;

                let ids: Vec<String> = response
                    .items
                    .into_iter()
                    .filter_map(|item| item.id.channel_id)
                    .collect();
                if ids.is_empty() {
                    return Ok(Vec::new());
                }

                let id_param = ids.join(",");
                let url = self.build_url(
                    "channels",
                    &[
                        ("part", "snippet,contentDetails,statistics,status"),
                        ("id", &id_param),
                    ],
                );
                let body = self.request(LIST_COST, "channels.list", &url).await?;
                let response: ChannelListResponse = decode(body, "channels.list")?;
                Ok(response
                    .items
                    .into_iter()
                    .map(ChannelItem::into_channel)
                    .collect())
            })
            .await
    }

    /// Fetches up to `max_results` recent uploads for a channel, newest
    /// first, optionally restricted to videos published after a cutoff.
    ///
    /// Walks the channel's uploads playlist page by page, then resolves
    /// statistics and duration in batches of 50. The whole listing is cached
    /// under a key that includes every parameter.
    ///
    /// # Errors
    ///
    /// Same classes as [`YoutubeClient::get_channel`]. A channel without an
    /// uploads playlist yields `Ok(vec![])`.
    pub async fn get_channel_videos(
        &self,
        channel_id: &str,
        max_results: usize,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Video>, YoutubeError> {
        let key = format!(
            "{channel_id}:{max_results}:{}",
            published_after.map(|t| t.to_rfc3339()).unwrap_or_default()
        );
        self.cache
            .fetch(ResourceKind::VideoListing, &key, || {
                self.load_channel_videos(channel_id, max_results, published_after)
            })
            .await
    }

    async fn load_channel_videos(
        &self,
        channel_id: &str,
        max_results: usize,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Video>, YoutubeError> {
        let channel = self.get_channel(channel_id).await?;
        let Some(playlist_id) = channel.uploads_playlist_id else {
            tracing::warn!(channel_id, "channel has no uploads playlist");
            return Ok(Vec::new());
        };

        let mut video_ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page_size = PAGE_SIZE.min(max_results - video_ids.len()).to_string();
            let mut params = vec![
                ("part", "contentDetails"),
                ("playlistId", playlist_id.as_str()),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let url = self.build_url("playlistItems", &params);
            let body = self.request(LIST_COST, "playlistItems.list", &url).await?;
            let response: PlaylistItemsResponse = decode(body, "playlistItems.list")?;

            if response.items.is_empty() {
                break;
            }
            video_ids.extend(
                response
                    .items
                    .into_iter()
                    .map(|item| item.content_details.video_id),
            );
            page_token = response.next_page_token;
            if video_ids.len() >= max_results || page_token.is_none() {
                break;
            }
        }
        video_ids.truncate(max_results);

        let mut videos: Vec<Video> = Vec::with_capacity(video_ids.len());
        for chunk in video_ids.chunks(PAGE_SIZE) {
            let id_param = chunk.join(",");
            let url = self.build_url(
                "videos",
                &[
                    ("part", "snippet,statistics,contentDetails"),
                    ("id", &id_param),
                ],
            );
            let body = self.request(LIST_COST, "videos.list", &url).await?;
            let response: VideoListResponse = decode(body, "videos.list")?;
            videos.extend(response.items.into_iter().map(VideoItem::into_video));
        }

        // The playlist endpoint cannot filter by date; apply the window here.
        if let Some(cutoff) = published_after {
            videos.retain(|v| v.published_at >= cutoff);
        }
        Ok(videos)
    }

    /// Builds the full request URL with properly percent-encoded query
    /// parameters, appending the API key last.
    fn build_url(&self, resource: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(resource);
        }
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("key", &self.api_key);
        }
        url
    }

    /// Reserves `cost` quota units and sends the request, retrying per the
    /// configured policy. Each retry attempt reserves quota again; the
    /// upstream bills failed attempts too.
    async fn request(
        &self,
        cost: u64,
        op: &'static str,
        url: &Url,
    ) -> Result<serde_json::Value, YoutubeError> {
        self.retry
            .execute(
                || {
                    let url = url.clone();
                    async move {
                        self.quota
                            .reserve(cost)
                            .map_err(|e| YoutubeError::QuotaExceeded(e.to_string()))?;
                        self.request_once(op, &url).await
                    }
                },
                upstream_retryable,
            )
            .await
    }

    async fn request_once(
        &self,
        op: &'static str,
        url: &Url,
    ) -> Result<serde_json::Value, YoutubeError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();

        if status.is_server_error() {
            // Keep 5xx as reqwest errors so the retry predicate sees them
            // as transient.
            return match response.error_for_status() {
                Err(e) => Err(YoutubeError::Http(e)),
                Ok(_) => Err(YoutubeError::ApiError(format!(
                    "{op}: unexpected server status {status}"
                ))),
            };
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_api_error(op, status, &body));
        }
        serde_json::from_str(&body).map_err(|e| YoutubeError::Deserialize {
            context: op.to_string(),
            source: e,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
    context: &str,
) -> Result<T, YoutubeError> {
    serde_json::from_value(body).map_err(|e| YoutubeError::Deserialize {
        context: context.to_string(),
        source: e,
    })
}

/// Maps the API's JSON error envelope onto the error taxonomy.
///
/// The envelope shape is `{"error": {"code": 403, "message": "...",
/// "errors": [{"reason": "quotaExceeded", ...}]}}`. Quota and rate-limit
/// reasons are recognised regardless of status class, and a bare 429 maps
/// to [`YoutubeError::QuotaExceeded`] too, so throttling is always
/// retriable and never mistaken for a genuine failure.
fn classify_api_error(op: &str, status: StatusCode, body: &str) -> YoutubeError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let reason = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/errors/0/reason"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");
    let message = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("no error message")
        .to_string();

    let throttled = matches!(
        reason,
        "quotaExceeded" | "dailyLimitExceeded" | "rateLimitExceeded" | "userRateLimitExceeded"
    );
    if throttled || status == StatusCode::TOO_MANY_REQUESTS {
        return YoutubeError::QuotaExceeded(message);
    }

    match status {
        StatusCode::FORBIDDEN => YoutubeError::Forbidden {
            context: format!("{op}: {message}"),
        },
        StatusCode::UNAUTHORIZED => YoutubeError::InvalidCredential(message),
        StatusCode::BAD_REQUEST if reason == "keyInvalid" => {
            YoutubeError::InvalidCredential(message)
        }
        StatusCode::NOT_FOUND => YoutubeError::NotFound {
            context: format!("{op}: {message}"),
        },
        _ => YoutubeError::ApiError(format!("{op}: {status} {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;

    fn test_client(base_url: &str) -> YoutubeClient {
        YoutubeClient::with_base_url(
            "test-key",
            30,
            Arc::new(QuotaLedger::new(10_000)),
            Arc::new(CachedFetcher::new(CacheConfig::default())),
            RetryPolicy::upstream().no_jitter(),
            base_url,
        )
        .expect("client construction should not fail")
    }

    #[test]
    fn build_url_appends_resource_and_key() {
        let client = test_client("https://www.googleapis.com/youtube/v3");
        let url = client.build_url("channels", &[("part", "snippet"), ("id", "UC1")]);
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/youtube/v3/channels?part=snippet&id=UC1&key=test-key"
        );
    }

    #[test]
    fn build_url_strips_trailing_slash() {
        let client = test_client("https://www.googleapis.com/youtube/v3/");
        let url = client.build_url("search", &[("q", "gaming")]);
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/youtube/v3/search?q=gaming&key=test-key"
        );
    }

    #[test]
    fn build_url_encodes_special_characters() {
        let client = test_client("https://www.googleapis.com/youtube/v3");
        let url = client.build_url("search", &[("q", "family & kids")]);
        assert!(
            url.as_str().contains("family+%26+kids") || url.as_str().contains("family%20%26%20kids"),
            "query param should be percent-encoded: {url}"
        );
    }

    #[test]
    fn classify_quota_exceeded() {
        let body = r#"{"error":{"code":403,"message":"Quota exceeded.","errors":[{"reason":"quotaExceeded"}]}}"#;
        let err = classify_api_error("search.list", StatusCode::FORBIDDEN, body);
        assert!(matches!(err, YoutubeError::QuotaExceeded(_)));
    }

    #[test]
    fn classify_too_many_requests_without_reason() {
        // A 429 carries no quota reason in the body but is still throttling.
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted.","errors":[{"reason":"rateLimitExceeded"}]}}"#;
        let err = classify_api_error("videos.list", StatusCode::TOO_MANY_REQUESTS, body);
        assert!(matches!(err, YoutubeError::QuotaExceeded(_)));

        let err = classify_api_error("videos.list", StatusCode::TOO_MANY_REQUESTS, "not json");
        assert!(
            matches!(err, YoutubeError::QuotaExceeded(_)),
            "a bare 429 must classify as quota exhaustion: {err:?}"
        );
    }

    #[test]
    fn classify_rate_limit_reason_regardless_of_status() {
        let body = r#"{"error":{"code":400,"message":"User rate limit exceeded.","errors":[{"reason":"userRateLimitExceeded"}]}}"#;
        let err = classify_api_error("search.list", StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, YoutubeError::QuotaExceeded(_)));
    }

    #[test]
    fn classify_forbidden_non_quota() {
        let body = r#"{"error":{"code":403,"message":"Access disabled.","errors":[{"reason":"accessNotConfigured"}]}}"#;
        let err = classify_api_error("channels.list", StatusCode::FORBIDDEN, body);
        assert!(matches!(err, YoutubeError::Forbidden { .. }));
    }

    #[test]
    fn classify_key_invalid() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","errors":[{"reason":"keyInvalid"}]}}"#;
        let err = classify_api_error("channels.list", StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, YoutubeError::InvalidCredential(_)));
    }

    #[test]
    fn classify_not_found() {
        let body = r#"{"error":{"code":404,"message":"Playlist not found.","errors":[{"reason":"playlistNotFound"}]}}"#;
        let err = classify_api_error("playlistItems.list", StatusCode::NOT_FOUND, body);
        assert!(matches!(err, YoutubeError::NotFound { .. }));
    }

    #[test]
    fn classify_unparseable_body_falls_back() {
        let err = classify_api_error("videos.list", StatusCode::BAD_REQUEST, "not json");
        assert!(matches!(err, YoutubeError::ApiError(_)));
    }
}
