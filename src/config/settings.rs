//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{AppPaths, ConfigStore};

/// Environment variables checked (in order) for an API key override.
const API_KEY_ENV_VARS: &[&str] = &["INTERVIEW_COACH_API_KEY", "GEMINI_API_KEY"];

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Connection and sampling settings for the generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the `generateContent` API.
    pub base_url: String,
    /// API key.  `None` (or empty) makes every pipeline run fail fast.
    pub api_key: Option<String>,
    /// Model identifier (e.g. `"gemini-2.0-flash"`).
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).  Lower = more deterministic.
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    /// Upper bound on generated tokens per call.
    pub max_output_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: None,
            model: "gemini-2.0-flash".into(),
            temperature: 0.2,
            top_k: 40,
            top_p: 0.8,
            max_output_tokens: 8192,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Retry / timeout policy applied around every generation sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Backoff before the next attempt is `backoff_unit_ms × 2^attempt`.
    pub backoff_unit_ms: u64,
    /// Hard wall-clock limit for a single model call.
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit_ms: 1_000,
            attempt_timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractionConfig
// ---------------------------------------------------------------------------

/// Input validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Text inputs longer than this (in characters) are rejected.
    pub max_text_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 20_000,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Where the directory-backed queues live.  `None` means the platform data
/// directory (see [`AppPaths`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub queue_dir: Option<std::path::PathBuf>,
    pub extra_queue_dir: Option<std::path::PathBuf>,
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `env_logger` filter; `RUST_LOG` still wins.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use interview_coach::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub extraction: ExtractionConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`,
    /// then apply environment overrides.
    ///
    /// Returns defaults when the file does not exist yet.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&AppPaths::new().settings_file)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace `llm.api_key` with the first non-empty key found in the
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        let from_env = API_KEY_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|key| !key.trim().is_empty());

        if let Some(key) = from_env {
            log::debug!("config: API key taken from environment");
            self.llm.api_key = Some(key);
        }
    }
}

impl ConfigStore for AppConfig {
    fn api_key(&self) -> Option<String> {
        self.llm
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    fn model_name(&self) -> String {
        self.llm.model.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.llm.base_url, loaded.llm.base_url);
        assert_eq!(original.llm.api_key, loaded.llm.api_key);
        assert_eq!(original.llm.model, loaded.llm.model);
        assert_eq!(original.llm.top_k, loaded.llm.top_k);
        assert_eq!(original.retry.max_attempts, loaded.retry.max_attempts);
        assert_eq!(
            original.retry.attempt_timeout_secs,
            loaded.retry.attempt_timeout_secs
        );
        assert_eq!(
            original.extraction.max_text_chars,
            loaded.extraction.max_text_chars
        );
        assert_eq!(original.logging.level, loaded.logging.level);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.llm.model, LlmConfig::default().model);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert!(cfg.llm.api_key.is_none());
        assert_eq!(cfg.llm.model, "gemini-2.0-flash");
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.backoff_unit_ms, 1_000);
        assert_eq!(cfg.extraction.max_text_chars, 20_000);
        assert!(cfg.capture.queue_dir.is_none());
        assert_eq!(cfg.logging.level, "info");
    }

    /// Sections left out of the file fall back to their defaults.
    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[llm]\nmodel = \"gemini-1.5-pro\"\n").unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.llm.model, "gemini-1.5-pro");
        assert_eq!(cfg.llm.top_k, 40);
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    fn config_store_treats_blank_key_as_missing() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.api_key(), None);

        cfg.llm.api_key = Some("   ".into());
        assert_eq!(cfg.api_key(), None);

        cfg.llm.api_key = Some("key-123".into());
        assert_eq!(cfg.api_key().as_deref(), Some("key-123"));
        assert_eq!(cfg.model_name(), "gemini-2.0-flash");
    }
}
