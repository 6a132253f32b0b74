//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\interview-coach\
//!   macOS:   ~/Library/Application Support/interview-coach/
//!   Linux:   ~/.config/interview-coach/
//!
//! Data dir (capture queues):
//!   Windows: %LOCALAPPDATA%\interview-coach\
//!   macOS:   ~/Library/Application Support/interview-coach/
//!   Linux:   ~/.local/share/interview-coach/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Main capture queue (screenshots, audio clips, text notes).
    pub queue_dir: PathBuf,
    /// Extra screenshots captured for debug mode.
    pub extra_queue_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "interview-coach";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            queue_dir: data_dir.join("queue"),
            extra_queue_dir: data_dir.join("extra_queue"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths.queue_dir.ends_with("queue"));
        assert!(paths.extra_queue_dir.ends_with("extra_queue"));
        assert_ne!(paths.queue_dir, paths.extra_queue_dir);
    }
}
