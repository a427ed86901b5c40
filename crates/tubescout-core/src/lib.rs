pub mod analysis;
pub mod app_config;
pub mod channels;
pub mod config;
pub mod keywords;
pub mod videos;

pub use analysis::{
    Analysis, AnalysisConfig, AnalysisId, AnalysisStatus, AnalysisSummary, OutlierResult,
};
pub use app_config::{AppConfig, Environment};
pub use channels::{Channel, FilterCriteria};
pub use config::{load_app_config, load_app_config_from_env, ConfigError};
pub use keywords::{load_keywords, KeywordConfig};
pub use videos::Video;
