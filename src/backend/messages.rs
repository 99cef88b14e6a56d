use crate::extractor::{PlaylistInfo, VideoInfo};
use crate::queue::{JobEvent, JobId, OptionOverrides};
use crate::utils::config::AppSettings;
use crate::utils::error::DownloadError;

/// Commands sent from an interactive surface to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Fetch metadata for a preview
    Probe { url: String },
    /// List the entries of a playlist or channel for selection
    ProbePlaylist { url: String },
    /// Queue a download using the current settings plus overrides
    Submit {
        url: String,
        overrides: OptionOverrides,
    },
    Cancel(JobId),
    Retry(JobId),
    Remove(JobId),
    ClearFinished,
    /// Replace and persist the settings
    UpdateSettings(AppSettings),
    // System
    Shutdown,
}

/// Events sent from the backend to an interactive surface
#[derive(Debug, Clone)]
pub enum BackendEvent {
    // Probing
    ProbeStarted {
        url: String,
    },
    ProbeCompleted {
        url: String,
        result: Result<VideoInfo, DownloadError>,
    },
    PlaylistProbed {
        url: String,
        result: Result<PlaylistInfo, DownloadError>,
    },

    // Job life-cycle, forwarded from the runner
    Job(JobEvent),

    SettingsSaved(AppSettings),

    // System
    Error(String),
}
