//! Utility modules for error handling, configuration and platform paths

pub mod config;
pub mod error;
pub mod platform;

// Re-export for convenience
pub use config::{AppSettings, SettingsStore, VideoFormat, VideoQuality};
pub use error::{DownloadError, RunnerError};
pub use platform::{default_download_dir, settings_path};
