//! yt-dlp wrapper for probing and downloading
//!
//! This module drives a yt-dlp subprocess. It supports both a bundled yt-dlp
//! (next to the executable, or inside a macOS .app bundle) and a
//! system-installed one.

use crate::extractor::models::{PlaylistInfo, VideoInfo, PLAYLIST_LIMIT};
use crate::extractor::options::{download_args, result_path, FetchRequest, FILEPATH_MARKER};
use crate::extractor::progress::{parse_playlist_item, FetchProgress};
use crate::extractor::traits::Extractor;
use crate::utils::error::DownloadError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a metadata probe may take before it counts as a network failure
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Extractor backed by the yt-dlp executable
pub struct YtDlpExtractor {
    ytdlp_path: PathBuf,
    probe_timeout: Duration,
}

/// Availability of the external tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub ytdlp_path: PathBuf,
    pub ytdlp_version: Option<String>,
    pub ffmpeg_path: Option<PathBuf>,
}

impl YtDlpExtractor {
    /// Initialize extractor and verify yt-dlp availability
    ///
    /// Search order:
    /// 1. Bundled yt-dlp (next to the executable / inside a macOS .app bundle)
    /// 2. System PATH
    /// 3. Common installation paths (Homebrew, pip --user, ...)
    pub fn new() -> Result<Self, DownloadError> {
        match find_ytdlp() {
            Some(path) => {
                info!("Found yt-dlp at: {}", path.display());
                Ok(Self::with_path(path))
            }
            None => {
                error!("yt-dlp not found anywhere!");
                Err(DownloadError::ExternalToolMissing {
                    tool: "yt-dlp".to_string(),
                })
            }
        }
    }

    /// Use a specific yt-dlp executable
    pub fn with_path(ytdlp_path: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Get the path to yt-dlp being used
    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp_path
    }

    /// Report yt-dlp version and whether ffmpeg is available for merging
    pub async fn check_tools(&self) -> ToolStatus {
        let ytdlp_version = match AsyncCommand::new(&self.ytdlp_path)
            .arg("--version")
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(_) => {
                warn!("yt-dlp --version failed");
                None
            }
            Err(e) => {
                warn!("yt-dlp could not be started: {}", e);
                None
            }
        };

        let ffmpeg_path = which::which("ffmpeg").ok();
        if ffmpeg_path.is_none() {
            warn!("ffmpeg not found; merging and re-encoding will fail");
        }

        ToolStatus {
            ytdlp_path: self.ytdlp_path.clone(),
            ytdlp_version,
            ffmpeg_path,
        }
    }

    /// Run a metadata-only yt-dlp invocation under the probe timeout and return stdout
    async fn run_metadata(&self, flags: &[&str], url: &str) -> Result<String, DownloadError> {
        let output = tokio::time::timeout(
            self.probe_timeout,
            AsyncCommand::new(&self.ytdlp_path)
                .args(flags)
                .arg("--no-warnings")
                .arg("--")
                .arg(url)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            DownloadError::NetworkFailure(format!(
                "metadata extraction timed out after {}s",
                self.probe_timeout.as_secs()
            ))
        })?
        .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("yt-dlp extraction failed: {}", stderr.trim());
            return Err(classify_stderr(&stderr, None));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_error(&self, err: std::io::Error) -> DownloadError {
        if err.kind() == std::io::ErrorKind::NotFound {
            DownloadError::ExternalToolMissing {
                tool: "yt-dlp".to_string(),
            }
        } else {
            DownloadError::AdapterFailure(format!(
                "failed to run {}: {}",
                self.ytdlp_path.display(),
                err
            ))
        }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    /// Uses: yt-dlp --dump-json --no-download
    async fn probe(&self, url: &str) -> Result<VideoInfo, DownloadError> {
        debug!("Extracting video info for URL: {}", url);

        let stdout = self
            .run_metadata(&["--dump-json", "--no-download", "--no-playlist"], url)
            .await?;
        let first_line = stdout.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        serde_json::from_str::<VideoInfo>(first_line).map_err(|e| {
            DownloadError::AdapterFailure(format!("could not parse yt-dlp metadata: {}", e))
        })
    }

    /// Uses: yt-dlp --flat-playlist --dump-single-json
    async fn probe_playlist(&self, url: &str) -> Result<PlaylistInfo, DownloadError> {
        debug!("Analyzing playlist for URL: {}", url);

        let limit = PLAYLIST_LIMIT.to_string();
        let stdout = self
            .run_metadata(
                &["--flat-playlist", "--dump-single-json", "--playlist-end", &limit],
                url,
            )
            .await?;
        PlaylistInfo::from_flat_json(stdout.trim(), url).map_err(|e| {
            DownloadError::AdapterFailure(format!("could not parse yt-dlp playlist: {}", e))
        })
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: mpsc::Sender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let args = download_args(request);
        debug!("Spawning yt-dlp {:?}", args);

        let mut child = AsyncCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // stdout carries `--newline` progress lines and one path marker per finished file
        let options = request.options.clone();
        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut final_path = None;
                let mut position = (1, 1);
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(path) = line.strip_prefix(FILEPATH_MARKER) {
                        final_path = Some(result_path(&options, path));
                    } else if let Some(item) = parse_playlist_item(&line) {
                        position = item;
                    } else if let Some(p) = FetchProgress::parse_ytdlp_line(&line) {
                        let p = p.within_playlist(position.0, position.1);
                        // a dropped receiver only means nobody is watching
                        let _ = progress.send(p).await;
                    }
                }
                final_path
            })
        });

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| self.spawn_error(e))?,
            _ = cancel.cancelled() => {
                info!("Cancelling yt-dlp for {}", request.url);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill yt-dlp: {}", e);
                }
                return Err(DownloadError::Cancelled);
            }
        };

        let final_path = match stdout_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => None,
        };
        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            error!("yt-dlp exited with {}: {}", status, stderr.trim());
            return Err(classify_stderr(&stderr, Some(&request.options.output_dir)));
        }

        final_path.ok_or_else(|| {
            DownloadError::AdapterFailure("yt-dlp finished without reporting an output file".into())
        })
    }
}

/// Map yt-dlp's stderr onto the error taxonomy
pub fn classify_stderr(stderr: &str, output_dir: Option<&Path>) -> DownloadError {
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .map(|l| l.trim().trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "yt-dlp exited without an error message".to_string());
    let lower = stderr.to_lowercase();

    if lower.contains("unsupported url") {
        return DownloadError::UnsupportedSource(message);
    }

    let tool_missing = lower.contains("not installed") || lower.contains("not found");
    if tool_missing && lower.contains("ffprobe") {
        return DownloadError::ExternalToolMissing {
            tool: "ffprobe".to_string(),
        };
    }
    if tool_missing && lower.contains("ffmpeg") {
        return DownloadError::ExternalToolMissing {
            tool: "ffmpeg".to_string(),
        };
    }

    if lower.contains("permission denied") || lower.contains("read-only file system") {
        return DownloadError::PermissionDenied {
            path: output_dir.map(Path::to_path_buf).unwrap_or_default(),
        };
    }

    const NETWORK_HINTS: &[&str] = &[
        "timed out",
        "timeout",
        "unable to download webpage",
        "unable to download json",
        "connection reset",
        "connection refused",
        "connection aborted",
        "network is unreachable",
        "name or service not known",
        "temporary failure in name resolution",
        "getaddrinfo failed",
        "nodename nor servname",
        "urlopen error",
        "http error 5",
        "incomplete read",
    ];
    if NETWORK_HINTS.iter().any(|hint| lower.contains(hint)) {
        return DownloadError::NetworkFailure(message);
    }

    DownloadError::AdapterFailure(message)
}

// ============================================================
// yt-dlp Detection Functions
// ============================================================

/// Find yt-dlp binary with priority:
/// 1. Bundled (next to the executable / inside .app bundle)
/// 2. System PATH
/// 3. Common installation paths
pub fn find_ytdlp() -> Option<PathBuf> {
    if let Some(bundled) = find_bundled_ytdlp() {
        info!("Using bundled yt-dlp: {:?}", bundled);
        return Some(bundled);
    }

    if let Ok(system) = which::which("yt-dlp") {
        info!("Using system yt-dlp: {:?}", system);
        return Some(system);
    }

    if let Some(common) = find_in_common_paths() {
        info!("Using yt-dlp from common path: {:?}", common);
        return Some(common);
    }

    warn!("yt-dlp not found anywhere!");
    None
}

/// Find yt-dlp shipped with the application
fn find_bundled_ytdlp() -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    // Structure: VideoDownloader.app/Contents/MacOS/videodownloader
    //                                /Resources/bin/yt-dlp
    if exe_dir.ends_with("MacOS") {
        let ytdlp_path = exe_dir.parent()?.join("Resources").join("bin").join("yt-dlp");
        debug!("Checking bundled path: {:?}", ytdlp_path);
        if is_executable(&ytdlp_path) {
            return Some(ytdlp_path);
        }
    }

    let dev_path = exe_dir.join(ytdlp_file_name());
    if is_executable(&dev_path) {
        return Some(dev_path);
    }

    None
}

/// Find yt-dlp in common installation paths
fn find_in_common_paths() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/opt/homebrew/bin/yt-dlp"),
        PathBuf::from("/usr/local/bin/yt-dlp"),
        PathBuf::from("/usr/bin/yt-dlp"),
        PathBuf::from("/Library/Frameworks/Python.framework/Versions/Current/bin/yt-dlp"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin").join("yt-dlp"));
    }

    candidates.into_iter().find(|p| is_executable(p))
}

fn ytdlp_file_name() -> &'static str {
    if cfg!(windows) {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

/// Check if a file is executable
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ============================================================
// Tests
// ============================================================
