//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and the [`ConfigStore`] view the
//! pipeline consumes.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, CaptureConfig, ExtractionConfig, LlmConfig, LoggingConfig, RetryConfig,
};

/// Read-only credentials/model lookup used when building the LLM client.
///
/// A `None` API key is a fatal precondition for any pipeline run.
pub trait ConfigStore: Send + Sync {
    fn api_key(&self) -> Option<String>;
    fn model_name(&self) -> String;
}
