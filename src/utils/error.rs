//! Error handling for videodownloader

use crate::queue::JobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Classified failure of a probe or a download.
///
/// Every failure reported by the extraction adapter is mapped onto one of these
/// before it reaches a job or the command line.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DownloadError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("required external tool is missing: {tool}")]
    ExternalToolMissing { tool: String },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("download cancelled")]
    Cancelled,

    #[error("download failed: {0}")]
    AdapterFailure(String),
}

impl DownloadError {
    /// Whether resubmitting the same job has a reasonable chance of succeeding
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::NetworkFailure(_))
    }

    /// Process exit code used by the command surface
    pub fn exit_code(&self) -> i32 {
        match self {
            DownloadError::AdapterFailure(_) => 1,
            DownloadError::InvalidInput(_) => 2,
            DownloadError::UnsupportedSource(_) => 3,
            DownloadError::NetworkFailure(_) => 4,
            DownloadError::ExternalToolMissing { .. } => 5,
            DownloadError::PermissionDenied { .. } => 6,
            DownloadError::Cancelled => 130,
        }
    }

    /// Map an I/O failure on `path` onto the taxonomy
    pub fn from_io(err: &std::io::Error, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => DownloadError::PermissionDenied {
                path: path.into(),
            },
            _ => DownloadError::AdapterFailure(format!("{}: {}", path.into().display(), err)),
        }
    }
}

/// Misuse of the job runner API
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} has not finished yet")]
    JobNotFinished(JobId),
}
