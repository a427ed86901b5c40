//! Outlier-discovery analysis: scoring, exclusion matching, batched
//! per-channel fan-out, and the pipeline that orchestrates them.

pub mod batch;
pub mod error;
pub mod exclusion;
pub mod export;
pub mod pipeline;
pub mod progress;
pub mod scoring;
pub mod store;

pub use batch::{BatchFailure, BatchOutcome, BatchProcessor, BatchProgress};
pub use error::AnalysisError;
pub use exclusion::{ExclusionIndex, ExclusionList, ExclusionMatch};
pub use pipeline::AnalysisPipeline;
pub use progress::{ProgressEvent, ProgressReporter, Stage};
pub use store::{AnalysisStore, InMemoryAnalysisStore, StoreError};
