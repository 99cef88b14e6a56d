//! Per-user locations used by videodownloader
//!
//! All paths are resolved from the user's home directory, never from the
//! current working directory, so a front-end launched from a desktop shell
//! (where the cwd is usually `/`) ends up in the same places as the CLI.

use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable that overrides the settings file location
pub const SETTINGS_ENV: &str = "VIDEODOWNLOADER_SETTINGS";

/// File name of the settings file inside the home directory
pub const SETTINGS_FILE_NAME: &str = ".videodownloader_settings.json";

/// Returns the user's home directory, falling back to the temp dir
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using temp dir");
        std::env::temp_dir()
    })
}

/// Returns the default download directory
/// - All platforms: ~/Downloads/VideoDownloader
pub fn default_download_dir() -> PathBuf {
    home_dir().join("Downloads").join("VideoDownloader")
}

/// Returns the settings file location
///
/// `$VIDEODOWNLOADER_SETTINGS` wins when set, otherwise
/// `~/.videodownloader_settings.json`.
pub fn settings_path() -> PathBuf {
    match std::env::var_os(SETTINGS_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => home_dir().join(SETTINGS_FILE_NAME),
    }
}

/// Turn a user supplied directory into an absolute path.
///
/// A leading `~` expands to the home directory; other relative paths are
/// resolved against the current directory.
pub fn absolute_dir(path: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    };

    match expanded.absolutize() {
        Ok(abs) => abs.into_owned(),
        Err(e) => {
            warn!("Failed to absolutize {:?}: {}", expanded, e);
            expanded
        }
    }
}
