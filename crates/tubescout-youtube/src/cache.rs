//! Read-through cache in front of the upstream client.
//!
//! A cache hit within TTL costs zero quota units. TTLs are layered by
//! resource kind: channel metadata changes slowly (24 h), per-channel video
//! listings drift faster (6 h), and search results fastest (2 h). Loader
//! failures propagate to the caller and are never cached.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Which upstream resource a cache entry describes; selects the TTL tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ChannelMetadata,
    VideoListing,
    Search,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::ChannelMetadata => "channel_metadata",
            ResourceKind::VideoListing => "video_listing",
            ResourceKind::Search => "search",
        };
        write!(f, "{s}")
    }
}

/// Per-tier TTLs. Defaults match the observed tiers: 24 h / 6 h / 2 h.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub channel_ttl: Duration,
    pub videos_ttl: Duration,
    pub search_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            channel_ttl: Duration::from_secs(24 * 60 * 60),
            videos_ttl: Duration::from_secs(6 * 60 * 60),
            search_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::ChannelMetadata => self.channel_ttl,
            ResourceKind::VideoListing => self.videos_ttl,
            ResourceKind::Search => self.search_ttl,
        }
    }
}

struct Entry {
    stored_at: Instant,
    value: Box<dyn Any + Send + Sync>,
}

/// Read-through cache keyed by `(resource kind, key)`.
///
/// The key must incorporate every parameter that affects the result
/// (resource id plus pagination/window parameters); callers build keys via
/// plain string formatting.
///
/// The internal lock is held only around map reads/writes, never across the
/// loader await, so concurrent callers do not serialize on upstream calls.
/// Two concurrent misses for the same key may both invoke their loaders; the
/// later write wins, which is harmless for idempotent reads.
pub struct CachedFetcher {
    config: CacheConfig,
    entries: Mutex<HashMap<(ResourceKind, String), Entry>>,
}

impl CachedFetcher {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch through the cache: return the cached value when fresh, otherwise
    /// run `loader`, store its result under this kind's TTL, and return it.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error unchanged; errors are never cached.
    pub async fn fetch<T, E, F, Fut>(
        &self,
        kind: ResourceKind,
        key: &str,
        loader: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.lookup::<T>(kind, key).await {
            tracing::debug!(kind = %kind, key, "cache hit");
            return Ok(hit);
        }

        let value = loader().await?;
        self.store(kind, key, value.clone()).await;
        Ok(value)
    }

    async fn lookup<T>(&self, kind: ResourceKind, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let ttl = self.config.ttl_for(kind);
        let entries = self.entries.lock().await;
        let entry = entries.get(&(kind, key.to_string()))?;
        if entry.stored_at.elapsed() > ttl {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    async fn store<T>(&self, kind: ResourceKind, key: &str, value: T)
    where
        T: Send + Sync + 'static,
    {
        let mut entries = self.entries.lock().await;
        entries.insert(
            (kind, key.to_string()),
            Entry {
                stored_at: Instant::now(),
                value: Box::new(value),
            },
        );
    }

    /// Drop a single entry, forcing the next fetch to reload.
    pub async fn invalidate(&self, kind: ResourceKind, key: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(&(kind, key.to_string()));
    }

    /// Drop every entry whose TTL has lapsed. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let config = self.config;
        entries.retain(|(kind, _), entry| entry.stored_at.elapsed() <= config.ttl_for(*kind));
        before - entries.len()
    }

    /// Number of live entries (including not-yet-purged expired ones).
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn zero_ttl_search() -> CacheConfig {
        CacheConfig {
            search_ttl: Duration::ZERO,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn second_fetch_hits_cache_without_loader() {
        let cache = CachedFetcher::new(CacheConfig::default());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value: Result<String, std::convert::Infallible> = cache
                .fetch(ResourceKind::ChannelMetadata, "UC1", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("hello".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "hello");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "loader should run once");
    }

    #[tokio::test]
    async fn expired_entry_reloads() {
        let cache = CachedFetcher::new(zero_ttl_search());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let _: Result<u32, std::convert::Infallible> = cache
                .fetch(ResourceKind::Search, "q", || async move {
                    Ok(calls.fetch_add(1, Ordering::SeqCst))
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2, "zero TTL must reload");
    }

    #[tokio::test]
    async fn loader_error_is_not_cached() {
        let cache = CachedFetcher::new(CacheConfig::default());
        let calls = Arc::new(AtomicU32::new(0));

        let c = Arc::clone(&calls);
        let first: Result<u32, String> = cache
            .fetch(ResourceKind::VideoListing, "UC1:50", || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("upstream down".to_string())
            })
            .await;
        assert!(first.is_err());

        let c = Arc::clone(&calls);
        let second: Result<u32, String> = cache
            .fetch(ResourceKind::VideoListing, "UC1:50", || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(second.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keys_are_scoped_by_kind() {
        let cache = CachedFetcher::new(CacheConfig::default());
        let _: Result<u32, std::convert::Infallible> = cache
            .fetch(ResourceKind::Search, "same-key", || async { Ok(1) })
            .await;
        let listing: Result<u32, std::convert::Infallible> = cache
            .fetch(ResourceKind::VideoListing, "same-key", || async { Ok(2) })
            .await;
        assert_eq!(listing.unwrap(), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let cache = CachedFetcher::new(CacheConfig::default());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let _: Result<u32, std::convert::Infallible> = cache
                .fetch(ResourceKind::ChannelMetadata, "UC1", || async move {
                    Ok(calls.fetch_add(1, Ordering::SeqCst))
                })
                .await;
            cache.invalidate(ResourceKind::ChannelMetadata, "UC1").await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_entries() {
        let cache = CachedFetcher::new(zero_ttl_search());
        let _: Result<u32, std::convert::Infallible> = cache
            .fetch(ResourceKind::Search, "stale", || async { Ok(1) })
            .await;
        let _: Result<u32, std::convert::Infallible> = cache
            .fetch(ResourceKind::ChannelMetadata, "fresh", || async { Ok(2) })
            .await;

        // The search entry has a zero TTL and never counts as a hit, so the
        // fetch above stored it; purge should now drop exactly that one.
        let removed = cache.purge_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn default_ttl_tiers() {
        let config = CacheConfig::default();
        assert_eq!(
            config.ttl_for(ResourceKind::ChannelMetadata),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            config.ttl_for(ResourceKind::VideoListing),
            Duration::from_secs(21_600)
        );
        assert_eq!(
            config.ttl_for(ResourceKind::Search),
            Duration::from_secs(7_200)
        );
    }
}
