//! Stub extractor shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use videodownloader::extractor::{
    Extractor, FetchProgress, FetchRequest, Format, PlaylistEntry, PlaylistInfo, VideoInfo,
};
use videodownloader::queue::{Job, JobHandle};
use videodownloader::DownloadError;

/// What a stub fetch does once it has reported progress
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(DownloadError),
    /// Wait for [`StubExtractor::release`] or cancellation
    Block,
    Panic,
}

pub struct StubExtractor {
    behavior: Behavior,
    progress_steps: Vec<f64>,
    gate: Semaphore,
    requests: Mutex<Vec<FetchRequest>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl StubExtractor {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            progress_steps: vec![10.0, 35.0, 20.0, 80.0],
            gate: Semaphore::new(0),
            requests: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn with_progress(mut self, steps: Vec<f64>) -> Self {
        self.progress_steps = steps;
        self
    }

    /// Let `n` blocked fetches finish successfully
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn output_path(request: &FetchRequest) -> PathBuf {
        request
            .options
            .output_dir
            .join(format!("Sample Video.{}", request.options.expected_extension()))
    }
}

pub fn sample_info() -> VideoInfo {
    VideoInfo {
        id: "vid123".to_string(),
        title: "Sample Video".to_string(),
        webpage_url: "https://example.com/watch?v=vid123".to_string(),
        duration: Some(60.0),
        uploader: Some("Uploader".to_string()),
        view_count: Some(1_000),
        description: Some("A sample".to_string()),
        extractor: Some("stub".to_string()),
        formats: vec![Format {
            format_id: "22".to_string(),
            ext: "mp4".to_string(),
            resolution: Some("1280x720".to_string()),
            vcodec: Some("avc1".to_string()),
            acodec: Some("mp4a".to_string()),
            width: Some(1280),
            height: Some(720),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Three-entry listing returned for URLs containing `list=`
pub fn sample_playlist(url: &str) -> PlaylistInfo {
    PlaylistInfo {
        id: "PL1".to_string(),
        title: "Sample Playlist".to_string(),
        uploader: Some("Uploader".to_string()),
        webpage_url: url.to_string(),
        is_playlist: true,
        entries: (1..=3)
            .map(|n| PlaylistEntry {
                id: format!("vid{}", n),
                title: format!("Video {}", n),
                url: format!("https://example.com/watch?v=vid{}", n),
                duration: Some(30.0 * n as f64),
                uploader: Some("Uploader".to_string()),
            })
            .collect(),
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    fn id(&self) -> &'static str {
        "stub"
    }

    async fn probe(&self, url: &str) -> Result<VideoInfo, DownloadError> {
        if url.contains("unsupported") {
            return Err(DownloadError::UnsupportedSource(url.to_string()));
        }
        Ok(sample_info())
    }

    async fn probe_playlist(&self, url: &str) -> Result<PlaylistInfo, DownloadError> {
        if url.contains("list=") {
            return Ok(sample_playlist(url));
        }
        let info = self.probe(url).await?;
        Ok(PlaylistInfo::single(&info, url))
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: mpsc::Sender<FetchProgress>,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        self.requests.lock().unwrap().push(request.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        for step in &self.progress_steps {
            let _ = progress.send(FetchProgress::new(*step).with_speed(1024.0)).await;
        }

        let result = match &self.behavior {
            Behavior::Succeed => Ok(Self::output_path(request)),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Block => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(DownloadError::Cancelled),
                    permit = self.gate.acquire() => match permit {
                        Ok(permit) => {
                            permit.forget();
                            Ok(Self::output_path(request))
                        }
                        Err(_) => Err(DownloadError::AdapterFailure("gate closed".to_string())),
                    },
                }
            }
            Behavior::Panic => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                panic!("stub extractor panicked");
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Wait for a job with a generous upper bound so a hang fails the test
pub async fn wait_for(handle: JobHandle) -> Job {
    tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("job did not finish in time")
}

/// Poll until `check` holds or the timeout expires
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
