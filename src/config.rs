//! Configuration management for the trawler.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "Trawler";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder value for unconfigured API keys.
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat completions API used by the `chat` backend.
    pub api: ApiConfig,

    /// Translation behavior settings.
    pub translation: TranslationConfig,

    /// Web scraping settings.
    pub scraping: ScrapingConfig,

    /// LLM prompts.
    pub prompts: PromptsConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// API configuration for LLM endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key (required for the chat backend).
    pub key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Model identifier.
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: API_KEY_PLACEHOLDER.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl ApiConfig {
    /// Checks if the API key is configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        !self.key.is_empty() && self.key != API_KEY_PLACEHOLDER
    }
}

/// Which service translates archived chapters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationBackend {
    /// OpenAI-compatible chat completions.
    #[default]
    Chat,
    /// NovelHi's translate endpoint.
    NovelHi,
}

/// Translation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub backend: TranslationBackend,

    /// Maximum bytes per translation chunk. Chunks break on line boundaries.
    pub chunk_size_chars: usize,

    /// Number of attempts per chunk for the chat backend.
    pub retries: u32,

    /// Delay between API requests in seconds.
    pub delay_between_requests_sec: f64,

    /// Number of message pairs to retain in conversation history.
    pub history_length: usize,

    /// Base URL of the NovelHi translate endpoint; the token is appended.
    pub novelhi_endpoint: String,

    pub novelhi_token: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: TranslationBackend::Chat,
            chunk_size_chars: 4000,
            retries: 3,
            delay_between_requests_sec: 1.0,
            history_length: 5,
            novelhi_endpoint: "https://novelhi.com/book/translate".to_string(),
            novelhi_token: String::new(),
        }
    }
}

/// Web scraping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Delay before each web request in seconds.
    pub delay_between_requests_sec: f64,

    /// Upper bound on table-of-contents pages walked for one book.
    pub max_toc_pages: u32,

    pub user_agent: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            delay_between_requests_sec: 1.0,
            max_toc_pages: 500,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"
                .to_string(),
        }
    }
}

/// LLM system prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Prompt for title translation.
    pub title_translation: String,

    /// Prompt for content translation.
    pub content_translation: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            title_translation: "You are a Chinese to English translator. Translate the following Chinese web novel chapter title to English. Keep the chapter number. Provide only the translated title, nothing else.".to_string(),
            content_translation: "You are a Chinese to English translator specializing in cultivation and fantasy web novels. Translate the following Chinese text to natural English, preserving the author's style, tone and paragraph breaks. Keep character and place names consistent with earlier parts of the conversation.".to_string(),
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the source-language archive.
    pub archive_directory: PathBuf,

    /// Root of the translated archive.
    pub translated_directory: PathBuf,

    /// Where EPUB files are written.
    pub export_directory: PathBuf,

    /// TOML table of chapter number corrections.
    /// Defaults to `discrepancies.toml` in the config directory.
    pub discrepancy_rules: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            archive_directory: PathBuf::from("archive"),
            translated_directory: PathBuf::from("translated"),
            export_directory: PathBuf::from("."),
            discrepancy_rules: None,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks settings needed before scraping.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraping.max_toc_pages == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scraping.max_toc_pages".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Checks settings needed before translating.
    pub fn validate_for_translation(&self) -> Result<(), ConfigError> {
        self.validate()?;

        match self.translation.backend {
            TranslationBackend::Chat if !self.api.is_configured() => {
                return Err(ConfigError::MissingValue(
                    "api.key (set your API key in config file)".to_string(),
                ));
            }
            TranslationBackend::NovelHi if self.translation.novelhi_token.trim().is_empty() => {
                return Err(ConfigError::MissingValue(
                    "translation.novelhi_token (set your NovelHi token in config file)".to_string(),
                ));
            }
            _ => {}
        }

        if self.translation.chunk_size_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "translation.chunk_size_chars".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the discrepancy rule file, using config or default.
    pub fn discrepancy_rules_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.paths.discrepancy_rules {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("discrepancies.toml")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.api.is_configured());
        assert_eq!(config.translation.backend, TranslationBackend::Chat);
        assert_eq!(config.translation.chunk_size_chars, 4000);
        assert_eq!(config.scraping.delay_between_requests_sec, 1.0);
        assert_eq!(config.scraping.max_toc_pages, 500);
        assert_eq!(config.paths.archive_directory, PathBuf::from("archive"));
    }

    #[test]
    fn test_api_configured_check() {
        let mut api = ApiConfig::default();
        assert!(!api.is_configured());

        api.key = "sk-real-key".to_string();
        assert!(api.is_configured());
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.translation.backend = TranslationBackend::NovelHi;
        config.paths.discrepancy_rules = Some(PathBuf::from("/tmp/rules.toml"));
        let file = NamedTempFile::new().unwrap();

        config.save_to(file.path()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.api.model, config.api.model);
        assert_eq!(loaded.translation.backend, TranslationBackend::NovelHi);
        assert_eq!(loaded.paths.discrepancy_rules, config.paths.discrepancy_rules);
        assert_eq!(loaded.scraping.user_agent, config.scraping.user_agent);
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.translation.retries, 3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "[translation]\nbackend = \"novelhi\"\nnovelhi_token = \"t\"\n\n[scraping]\nmax_toc_pages = 3\n",
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.translation.backend, TranslationBackend::NovelHi);
        assert_eq!(config.translation.chunk_size_chars, 4000);
        assert_eq!(config.scraping.max_toc_pages, 3);
        assert_eq!(config.scraping.delay_between_requests_sec, 1.0);
        assert!(config.validate_for_translation().is_ok());
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[translation\nbackend = 1").unwrap();
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.validate_for_translation().is_err()); // API key not set

        let mut config = Config::default();
        config.api.key = "real-key".to_string();
        assert!(config.validate_for_translation().is_ok());

        config.translation.chunk_size_chars = 0;
        assert!(matches!(
            config.validate_for_translation(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_novelhi_validation_needs_token() {
        let mut config = Config::default();
        config.translation.backend = TranslationBackend::NovelHi;
        assert!(matches!(
            config.validate_for_translation(),
            Err(ConfigError::MissingValue(_))
        ));

        config.translation.novelhi_token = "token".to_string();
        assert!(config.validate_for_translation().is_ok());
    }

    #[test]
    fn test_zero_page_limit_rejected() {
        let mut config = Config::default();
        config.scraping.max_toc_pages = 0;
        assert!(config.validate().is_err());
    }
}
