//! videodownloader library

pub mod backend;
pub mod cli;
pub mod extractor;
pub mod queue;
pub mod utils;

// Re-export main types for easier use
pub use extractor::{
    Extractor, FetchProgress, FetchRequest, Format, PlaylistInfo, VideoInfo, YtDlpExtractor,
};
pub use queue::{Job, JobEvent, JobHandle, JobId, JobOptions, JobRunner, JobStatus, OptionOverrides};
pub use utils::{AppSettings, DownloadError, SettingsStore, VideoFormat, VideoQuality};
