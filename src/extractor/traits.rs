use crate::extractor::models::{PlaylistInfo, VideoInfo};
use crate::extractor::options::FetchRequest;
use crate::extractor::progress::FetchProgress;
use crate::utils::error::DownloadError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Core trait for the extraction/download backend
///
/// This trait isolates the application from the specific extraction tool
/// (yt-dlp subprocess, test stubs, ...). Every failure comes back already
/// classified as a [`DownloadError`].
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns a unique identifier for this extractor (e.g., "yt-dlp")
    fn id(&self) -> &'static str;

    /// Fetch metadata for `url` without downloading any media
    async fn probe(&self, url: &str) -> Result<VideoInfo, DownloadError>;

    /// List the entries behind a playlist or channel URL without downloading.
    ///
    /// Extractors without playlist support report the probed video as the only entry.
    async fn probe_playlist(&self, url: &str) -> Result<PlaylistInfo, DownloadError> {
        let info = self.probe(url).await?;
        Ok(PlaylistInfo::single(&info, url))
    }

    /// Download `request.url` with the request's options and return the final file path.
    ///
    /// Progress reports go to `progress`; a closed receiver is not an error.
    /// Implementations check `cancel` whenever they can and return
    /// [`DownloadError::Cancelled`] once it fires. Partial files are left in place.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: mpsc::Sender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DownloadError>;
}
