pub mod cache;
pub mod client;
pub mod error;
pub mod quota;
pub mod retry;
pub mod types;

pub use cache::{CacheConfig, CachedFetcher, ResourceKind};
pub use client::{YoutubeClient, LIST_COST, SEARCH_COST};
pub use error::YoutubeError;
pub use quota::{QuotaError, QuotaLedger};
pub use retry::RetryPolicy;
