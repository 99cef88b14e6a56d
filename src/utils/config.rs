//! Application configuration and its on-disk store

use crate::utils::error::DownloadError;
use crate::utils::platform;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Schema version written into every settings file
pub const SCHEMA_VERSION: u64 = 1;

/// Worker pool size used when nothing else is configured
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 3;

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Download location (always absolute)
    pub output_dir: PathBuf,

    /// Preferred video quality
    pub quality: VideoQuality,

    /// Preferred container
    pub format: VideoFormat,

    /// Download the audio track only
    pub audio_only: bool,

    /// Also fetch English subtitles
    pub include_subtitles: bool,

    /// Maximum concurrent downloads
    pub concurrent_downloads: usize,

    /// Sort downloads into `<playlist or uploader>/` sub-folders
    pub organize_in_folders: bool,

    /// Write the extractor's `.info.json` next to the media file
    pub save_metadata: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            output_dir: platform::default_download_dir(),
            quality: VideoQuality::Best,
            format: VideoFormat::Mp4,
            audio_only: false,
            include_subtitles: false,
            concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
            organize_in_folders: false,
            save_metadata: false,
        }
    }
}

/// Video quality options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum VideoQuality {
    #[serde(rename = "best")]
    #[value(name = "best")]
    Best,
    #[serde(rename = "worst")]
    #[value(name = "worst")]
    Worst,
    #[serde(rename = "720p")]
    #[value(name = "720p")]
    P720,
    #[serde(rename = "480p")]
    #[value(name = "480p")]
    P480,
    #[serde(rename = "360p")]
    #[value(name = "360p")]
    P360,
}

impl VideoQuality {
    /// Get string representation as stored in the settings file
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoQuality::Best => "best",
            VideoQuality::Worst => "worst",
            VideoQuality::P720 => "720p",
            VideoQuality::P480 => "480p",
            VideoQuality::P360 => "360p",
        }
    }

    /// Height cap for the fixed-resolution presets
    pub fn max_height(&self) -> Option<u32> {
        match self {
            VideoQuality::P720 => Some(720),
            VideoQuality::P480 => Some(480),
            VideoQuality::P360 => Some(360),
            VideoQuality::Best | VideoQuality::Worst => None,
        }
    }
}

impl std::fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Webm,
    Mkv,
    Any,
}

impl VideoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Any => "any",
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names accepted by [`AppSettings::set_field`]
pub const SETTING_KEYS: &[&str] = &[
    "output_dir",
    "quality",
    "format",
    "audio_only",
    "include_subtitles",
    "concurrent_downloads",
    "organize_in_folders",
    "save_metadata",
];

impl AppSettings {
    /// Build settings from an arbitrary JSON document.
    ///
    /// Each known key is read on its own; a missing key or a value that does
    /// not parse keeps that key's default. Unknown keys are ignored.
    pub fn from_json_value(value: Value) -> Self {
        let defaults = Self::default();
        let Value::Object(map) = value else {
            warn!("Settings file is not a JSON object, using defaults");
            return defaults;
        };

        // older schemas are read key by key; newer or unreadable ones are not
        match map.get("version").map(Value::as_u64) {
            None => {}
            Some(Some(version)) if version <= SCHEMA_VERSION => {}
            Some(Some(version)) => {
                warn!(
                    "Settings schema version {} is newer than {}, using defaults",
                    version, SCHEMA_VERSION
                );
                return defaults;
            }
            Some(None) => {
                warn!("Settings schema version is not a number, using defaults");
                return defaults;
            }
        }

        let settings = Self {
            output_dir: field(&map, &["output_dir"], defaults.output_dir.clone()),
            quality: field(&map, &["quality"], defaults.quality),
            format: field(&map, &["format", "format_preference"], defaults.format),
            audio_only: field(&map, &["audio_only"], defaults.audio_only),
            include_subtitles: field(&map, &["include_subtitles"], defaults.include_subtitles),
            concurrent_downloads: field(
                &map,
                &["concurrent_downloads"],
                defaults.concurrent_downloads,
            ),
            organize_in_folders: field(
                &map,
                &["organize_in_folders"],
                defaults.organize_in_folders,
            ),
            save_metadata: field(&map, &["save_metadata"], defaults.save_metadata),
        };

        settings.normalized()
    }

    /// Enforce sane values: absolute output dir, at least one worker
    pub fn normalized(mut self) -> Self {
        self.output_dir = platform::absolute_dir(&self.output_dir);
        if self.concurrent_downloads == 0 {
            self.concurrent_downloads = 1;
        }
        self
    }

    /// Update one setting from its textual form
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<(), DownloadError> {
        let invalid = |what: &str| {
            DownloadError::InvalidInput(format!("invalid value {:?} for {}: {}", value, key, what))
        };

        match key {
            "output_dir" => {
                if value.trim().is_empty() {
                    return Err(invalid("expected a directory"));
                }
                self.output_dir = platform::absolute_dir(Path::new(value.trim()));
            }
            "quality" => {
                self.quality = VideoQuality::from_str(value, true)
                    .map_err(|_| invalid("expected best, worst, 720p, 480p or 360p"))?;
            }
            "format" | "format_preference" => {
                self.format = VideoFormat::from_str(value, true)
                    .map_err(|_| invalid("expected mp4, webm, mkv or any"))?;
            }
            "audio_only" => {
                self.audio_only =
                    parse_bool(value).ok_or_else(|| invalid("expected true or false"))?
            }
            "include_subtitles" => {
                self.include_subtitles =
                    parse_bool(value).ok_or_else(|| invalid("expected true or false"))?
            }
            "organize_in_folders" => {
                self.organize_in_folders =
                    parse_bool(value).ok_or_else(|| invalid("expected true or false"))?
            }
            "save_metadata" => {
                self.save_metadata =
                    parse_bool(value).ok_or_else(|| invalid("expected true or false"))?
            }
            "concurrent_downloads" => {
                let n: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a positive integer"))?;
                if n == 0 {
                    return Err(invalid("expected a positive integer"));
                }
                self.concurrent_downloads = n;
            }
            other => {
                return Err(DownloadError::InvalidInput(format!(
                    "unknown setting {:?} (known: {})",
                    other,
                    SETTING_KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }
}

fn field<T: DeserializeOwned>(map: &Map<String, Value>, keys: &[&str], default: T) -> T {
    for key in keys {
        if let Some(raw) = map.get(*key) {
            return match serde_json::from_value(raw.clone()) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Ignoring invalid setting {}={}: {}", key, raw, e);
                    default
                }
            };
        }
    }
    default
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// On-disk layout: the settings plus the schema version
#[derive(Serialize)]
struct SettingsFile<'a> {
    version: u64,
    #[serde(flatten)]
    settings: &'a AppSettings,
}

/// Loads and saves [`AppSettings`] at a fixed location
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the per-user location (see [`platform::settings_path`])
    pub fn default_location() -> Self {
        Self::new(platform::settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings file. Never fails: any problem yields defaults.
    pub fn load(&self) -> AppSettings {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {:?}, using defaults", self.path);
                return AppSettings::default();
            }
            Err(e) => {
                warn!("Failed to read settings {:?}: {}", self.path, e);
                return AppSettings::default();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(value) => AppSettings::from_json_value(value),
            Err(e) => {
                warn!("Failed to parse settings {:?}: {}", self.path, e);
                AppSettings::default()
            }
        }
    }

    /// Write the settings atomically (temp file in the same directory, then rename)
    pub fn save(&self, settings: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(&SettingsFile {
            version: SCHEMA_VERSION,
            settings,
        })?;

        let tmp_path = self.temp_path();
        {
            let mut file = std::fs::File::create(&tmp_path)
                .with_context(|| format!("Failed to create {:?}", tmp_path))?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }

        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e).with_context(|| format!("Failed to replace {:?}", self.path));
        }

        debug!("Saved settings to {:?}", self.path);
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "settings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
