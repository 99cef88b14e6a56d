//! A single download job and its state machine

use crate::extractor::FetchProgress;
use crate::utils::config::{AppSettings, VideoFormat, VideoQuality};
use crate::utils::error::DownloadError;
use crate::utils::platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Opaque job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options a job runs with, fixed at submission time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub output_dir: PathBuf,
    pub quality: VideoQuality,
    pub format: VideoFormat,
    pub audio_only: bool,
    pub include_subtitles: bool,
    pub organize_in_folders: bool,
    pub save_metadata: bool,
    /// Exact extractor format id; bypasses quality/format selection
    pub format_id: Option<String>,
    /// Write metadata, subtitles, thumbnail and description without the media
    #[serde(default)]
    pub metadata_only: bool,
    /// Fetch every entry when the URL is a playlist instead of just the video
    #[serde(default)]
    pub whole_playlist: bool,
}

impl JobOptions {
    /// Snapshot of the current settings
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            output_dir: settings.output_dir.clone(),
            quality: settings.quality,
            format: settings.format,
            audio_only: settings.audio_only,
            include_subtitles: settings.include_subtitles,
            organize_in_folders: settings.organize_in_folders,
            save_metadata: settings.save_metadata,
            format_id: None,
            metadata_only: false,
            whole_playlist: false,
        }
    }

    /// Settings snapshot with per-job overrides applied
    pub fn resolve(settings: &AppSettings, overrides: &OptionOverrides) -> Self {
        let mut options = Self::from_settings(settings);
        if let Some(dir) = &overrides.output_dir {
            options.output_dir = platform::absolute_dir(dir);
        }
        if let Some(quality) = overrides.quality {
            options.quality = quality;
        }
        if let Some(format) = overrides.format {
            options.format = format;
        }
        if let Some(audio_only) = overrides.audio_only {
            options.audio_only = audio_only;
        }
        if let Some(subs) = overrides.include_subtitles {
            options.include_subtitles = subs;
        }
        if let Some(format_id) = overrides
            .format_id
            .as_ref()
            .filter(|id| !id.trim().is_empty())
        {
            options.format_id = Some(format_id.trim().to_string());
        }
        if let Some(metadata_only) = overrides.metadata_only {
            options.metadata_only = metadata_only;
        }
        if let Some(whole_playlist) = overrides.whole_playlist {
            options.whole_playlist = whole_playlist;
        }
        options
    }

    /// Extension the finished file is expected to have
    pub fn expected_extension(&self) -> &'static str {
        if self.metadata_only {
            return "info.json";
        }
        match (self.audio_only, self.format) {
            (true, VideoFormat::Webm) => "webm",
            (true, _) => "m4a",
            (false, VideoFormat::Any) => "mp4",
            (false, format) => format.as_str(),
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

/// Per-job overrides of the persisted settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionOverrides {
    pub output_dir: Option<PathBuf>,
    pub quality: Option<VideoQuality>,
    pub format: Option<VideoFormat>,
    pub audio_only: Option<bool>,
    pub include_subtitles: Option<bool>,
    pub format_id: Option<String>,
    pub metadata_only: Option<bool>,
    pub whole_playlist: Option<bool>,
}

/// Validate a user supplied media URL
pub fn validate_url(url: &str) -> Result<String, DownloadError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(DownloadError::InvalidInput("URL must not be empty".to_string()));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|e| DownloadError::InvalidInput(format!("malformed URL {:?}: {}", trimmed, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DownloadError::InvalidInput(format!(
            "URL must use http or https: {}",
            trimmed
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(DownloadError::InvalidInput(format!("URL has no host: {}", trimmed)));
    }

    Ok(trimmed.to_string())
}

/// One requested download and its tracked state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub options: JobOptions,
    pub status: JobStatus,
    pub progress_percent: f64,
    /// bytes per second
    pub speed: Option<f64>,
    /// seconds remaining
    pub eta: Option<u64>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub result_path: Option<PathBuf>,
    pub error: Option<DownloadError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job. Fails with `InvalidInput` for a bad URL.
    pub fn new(url: &str, options: JobOptions) -> Result<Self, DownloadError> {
        let url = validate_url(url)?;
        Ok(Self {
            id: JobId::new(),
            url,
            options,
            status: JobStatus::Queued,
            progress_percent: 0.0,
            speed: None,
            eta: None,
            downloaded_bytes: None,
            total_bytes: None,
            result_path: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Queued -> Running
    pub(crate) fn start(&mut self) -> bool {
        if self.status != JobStatus::Queued {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Record a progress report. Percent never moves backwards.
    pub(crate) fn apply_progress(&mut self, progress: &FetchProgress) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let percent = progress.percent.clamp(0.0, 100.0);
        if percent > self.progress_percent {
            self.progress_percent = percent;
        }
        if progress.speed.is_some() {
            self.speed = progress.speed;
        }
        if progress.eta.is_some() {
            self.eta = progress.eta;
        }
        if progress.downloaded_bytes.is_some() {
            self.downloaded_bytes = progress.downloaded_bytes;
        }
        if progress.total_bytes.is_some() {
            self.total_bytes = progress.total_bytes;
        }
        true
    }

    /// Set the terminal state. Returns false if the job already finished.
    pub(crate) fn finish(&mut self, outcome: Result<PathBuf, DownloadError>) -> bool {
        if self.is_terminal() {
            return false;
        }
        match outcome {
            Ok(path) => {
                self.status = JobStatus::Completed;
                self.progress_percent = 100.0;
                self.eta = Some(0);
                self.result_path = Some(path);
            }
            Err(DownloadError::Cancelled) => {
                self.status = JobStatus::Cancelled;
            }
            Err(e) => {
                self.status = JobStatus::Failed;
                self.error = Some(e);
            }
        }
        self.finished_at = Some(Utc::now());
        true
    }

    /// Mark as cancelled. Returns false if the job already finished.
    pub(crate) fn cancel(&mut self) -> bool {
        self.finish(Err(DownloadError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("https://example.com/watch?v=abc", JobOptions::default()).unwrap()
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/watch?v=abc").is_ok());
        assert!(validate_url("  http://youtu.be/abc  ").is_ok());
        assert!(matches!(validate_url(""), Err(DownloadError::InvalidInput(_))));
        assert!(matches!(validate_url("   "), Err(DownloadError::InvalidInput(_))));
        assert!(matches!(validate_url("not a url"), Err(DownloadError::InvalidInput(_))));
        assert!(matches!(
            validate_url("ftp://example.com/x"),
            Err(DownloadError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress_percent, 0.0);
        assert!(job.result_path.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = job();
        assert!(!job.apply_progress(&FetchProgress::new(10.0)), "queued jobs ignore progress");
        job.start();
        job.apply_progress(&FetchProgress::new(40.0).with_speed(100.0));
        job.apply_progress(&FetchProgress::new(15.0).with_eta(3));
        assert_eq!(job.progress_percent, 40.0);
        assert_eq!(job.speed, Some(100.0));
        assert_eq!(job.eta, Some(3));
    }

    #[test]
    fn test_terminal_state_set_once() {
        let mut job = job();
        job.start();
        assert!(job.finish(Ok(PathBuf::from("/tmp/out/a.mp4"))));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100.0);

        assert!(!job.finish(Err(DownloadError::NetworkFailure("late".into()))));
        assert!(!job.cancel());
        assert!(!job.apply_progress(&FetchProgress::new(50.0)));
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_failure_records_error_only() {
        let mut job = job();
        job.start();
        job.finish(Err(DownloadError::UnsupportedSource("x".into())));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result_path.is_none());
        assert_eq!(job.error, Some(DownloadError::UnsupportedSource("x".into())));
    }

    #[test]
    fn test_cancel_queued_job() {
        let mut job = job();
        assert!(job.cancel());
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.error.is_none());
        assert!(!job.start());
    }

    #[test]
    fn test_overrides() {
        let settings = AppSettings::default();
        let overrides = OptionOverrides {
            quality: Some(VideoQuality::P720),
            output_dir: Some(PathBuf::from("/tmp/out")),
            audio_only: Some(true),
            format_id: Some("  ".into()),
            ..Default::default()
        };
        let options = JobOptions::resolve(&settings, &overrides);
        assert_eq!(options.quality, VideoQuality::P720);
        assert_eq!(options.format, settings.format);
        assert_eq!(options.output_dir, PathBuf::from("/tmp/out"));
        assert!(options.audio_only);
        assert_eq!(options.format_id, None);
    }

    #[test]
    fn test_expected_extension() {
        let mut options = JobOptions::default();
        assert_eq!(options.expected_extension(), "mp4");
        options.format = VideoFormat::Mkv;
        assert_eq!(options.expected_extension(), "mkv");
        options.audio_only = true;
        assert_eq!(options.expected_extension(), "m4a");
        options.metadata_only = true;
        assert_eq!(options.expected_extension(), "info.json");
    }

    #[test]
    fn test_mode_overrides() {
        let overrides = OptionOverrides {
            metadata_only: Some(true),
            whole_playlist: Some(true),
            ..Default::default()
        };
        let options = JobOptions::resolve(&AppSettings::default(), &overrides);
        assert!(options.metadata_only);
        assert!(options.whole_playlist);
        assert!(!JobOptions::default().metadata_only);
    }

    #[test]
    fn test_job_id_round_trips_through_string() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
