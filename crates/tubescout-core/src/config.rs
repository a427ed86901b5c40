use std::path::PathBuf;

use thiserror::Error;

use crate::app_config::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read keywords file {path}: {source}")]
    KeywordsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse keywords file: {0}")]
    KeywordsFileParse(#[from] serde_yaml::Error),

    #[error("invalid keywords file: {0}")]
    KeywordsInvalid(String),
}

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files; useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup, no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<i64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<f64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: format!("expected true/false, got '{other}'"),
            }),
        }
    };

    let youtube_api_key = require("YOUTUBE_API_KEY")?;
    let env = parse_environment(&or_default("TUBESCOUT_ENV", "development"))?;
    let log_level = or_default("TUBESCOUT_LOG_LEVEL", "info");

    let youtube_timeout_secs = parse_u64("TUBESCOUT_YOUTUBE_TIMEOUT_SECS", "30")?;
    let quota_daily_limit = parse_u64("TUBESCOUT_QUOTA_DAILY_LIMIT", "10000")?;

    let cache_channel_ttl_secs = parse_u64("TUBESCOUT_CACHE_CHANNEL_TTL_SECS", "86400")?;
    let cache_videos_ttl_secs = parse_u64("TUBESCOUT_CACHE_VIDEOS_TTL_SECS", "21600")?;
    let cache_search_ttl_secs = parse_u64("TUBESCOUT_CACHE_SEARCH_TTL_SECS", "7200")?;

    let upstream_max_attempts = parse_u32("TUBESCOUT_UPSTREAM_MAX_ATTEMPTS", "5")?;
    let upstream_base_delay_ms = parse_u64("TUBESCOUT_UPSTREAM_BASE_DELAY_MS", "2000")?;

    let outlier_threshold = parse_f64("TUBESCOUT_OUTLIER_THRESHOLD", "20")?;
    let brand_fit_minimum = parse_f64("TUBESCOUT_BRAND_FIT_MINIMUM", "6.0")?;
    let min_subscribers = parse_u64("TUBESCOUT_MIN_SUBSCRIBERS", "10000")?;
    let max_subscribers = parse_u64("TUBESCOUT_MAX_SUBSCRIBERS", "500000")?;
    let min_videos = parse_u64("TUBESCOUT_MIN_VIDEOS", "10")?;
    let require_family_safe = parse_bool("TUBESCOUT_REQUIRE_FAMILY_SAFE", "true")?;
    let time_window_days = parse_i64("TUBESCOUT_TIME_WINDOW_DAYS", "30")?;
    let max_results = parse_usize("TUBESCOUT_MAX_RESULTS", "50")?;
    let batch_size = parse_usize("TUBESCOUT_BATCH_SIZE", "5")?;
    let worker_concurrency = parse_usize("TUBESCOUT_WORKER_CONCURRENCY", "3")?;
    let job_stalled_after_secs = parse_u64("TUBESCOUT_JOB_STALLED_AFTER_SECS", "600")?;
    let keywords_path = PathBuf::from(or_default(
        "TUBESCOUT_KEYWORDS_PATH",
        "./config/keywords.yaml",
    ));

    if min_subscribers > max_subscribers {
        return Err(ConfigError::InvalidEnvVar {
            var: "TUBESCOUT_MIN_SUBSCRIBERS".to_string(),
            reason: format!("min ({min_subscribers}) exceeds max ({max_subscribers})"),
        });
    }

    Ok(AppConfig {
        env,
        log_level,
        youtube_api_key,
        youtube_timeout_secs,
        quota_daily_limit,
        cache_channel_ttl_secs,
        cache_videos_ttl_secs,
        cache_search_ttl_secs,
        upstream_max_attempts,
        upstream_base_delay_ms,
        outlier_threshold,
        brand_fit_minimum,
        min_subscribers,
        max_subscribers,
        min_videos,
        require_family_safe,
        time_window_days,
        max_results,
        batch_size,
        worker_concurrency,
        job_stalled_after_secs,
        keywords_path,
    })
}

fn parse_environment(raw: &str) -> Result<Environment, ConfigError> {
    match raw {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TUBESCOUT_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}
