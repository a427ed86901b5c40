use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Keyword lists driving brand-fit scoring and exclusion-term extraction.
///
/// Loaded from `config/keywords.yaml`. All entries are normalised to
/// lowercase on load; matching code assumes lowercase terms throughout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Positive tone indicators ("funny", "moments", ...): +1 each hit.
    pub positive: Vec<String>,
    /// Family/kid-audience terms: +1 each hit.
    pub family: Vec<String>,
    /// Adult/mature terms: -2 each hit.
    pub adult: Vec<String>,
    /// Horror indicators: -1 unless a positive qualifier is also present.
    pub horror: Vec<String>,
    /// Known game/content names used to build exclusion lists from
    /// competitor uploads.
    pub known_games: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            positive: vec![
                "funny".to_string(),
                "moments".to_string(),
                "hilarious".to_string(),
                "best".to_string(),
            ],
            family: vec![
                "family".to_string(),
                "kids".to_string(),
                "kid friendly".to_string(),
                "no swearing".to_string(),
            ],
            adult: vec![
                "mature".to_string(),
                "18+".to_string(),
                "nsfw".to_string(),
                "gore".to_string(),
            ],
            horror: vec!["horror".to_string(), "scary".to_string()],
            known_games: vec![
                "minecraft".to_string(),
                "fortnite".to_string(),
                "roblox".to_string(),
                "doors".to_string(),
                "valorant".to_string(),
                "league of legends".to_string(),
                "apex legends".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeywordsFile {
    keywords: KeywordConfig,
}

/// Load and validate the keyword configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_keywords(path: &Path) -> Result<KeywordConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::KeywordsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_keywords(&content)
}

fn parse_keywords(content: &str) -> Result<KeywordConfig, ConfigError> {
    let file: KeywordsFile = serde_yaml::from_str(content)?;
    let mut config = file.keywords;
    normalise(&mut config);
    validate(&config)?;
    Ok(config)
}

fn normalise(config: &mut KeywordConfig) {
    for list in [
        &mut config.positive,
        &mut config.family,
        &mut config.adult,
        &mut config.horror,
        &mut config.known_games,
    ] {
        for term in list.iter_mut() {
            *term = term.trim().to_lowercase();
        }
        list.retain(|t| !t.is_empty());
    }
}

fn validate(config: &KeywordConfig) -> Result<(), ConfigError> {
    if config.known_games.is_empty() {
        return Err(ConfigError::KeywordsInvalid(
            "known_games must contain at least one entry".to_string(),
        ));
    }
    if config.positive.is_empty() {
        return Err(ConfigError::KeywordsInvalid(
            "positive must contain at least one entry".to_string(),
        ));
    }
    Ok(())
}
