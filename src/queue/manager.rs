//! Job runner with a bounded pool of download workers

use crate::extractor::{Extractor, FetchProgress, FetchRequest};
use crate::queue::events::{EventBus, JobEvent};
use crate::queue::job::{Job, JobId, JobOptions, JobStatus};
use crate::utils::error::{DownloadError, RunnerError};
use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Buffer per event subscriber
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Buffer between an adapter and its worker
const PROGRESS_CHANNEL_CAPACITY: usize = 100;

/// Runs submitted jobs through an [`Extractor`], at most `pool_size` at a time.
///
/// Cloning is cheap; all clones share the same job table.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<RunnerState>,
    extractor: Arc<dyn Extractor>,
}

struct RunnerState {
    jobs: HashMap<JobId, JobRecord>,
    order: Vec<JobId>,
    pending: VecDeque<JobId>,
    active: usize,
    pool_size: usize,
    events: EventBus,
}

struct JobRecord {
    job: Job,
    cancel: CancellationToken,
    watch: watch::Sender<Job>,
}

impl JobRecord {
    fn publish_state(&self) {
        self.watch.send_replace(self.job.clone());
    }
}

/// Handle to a submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    rx: watch::Receiver<Job>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Receiver that always holds the latest state of this job
    pub fn watch(&self) -> watch::Receiver<Job> {
        self.rx.clone()
    }

    pub fn snapshot(&self) -> Job {
        self.rx.borrow().clone()
    }

    /// Wait until the job reaches a terminal state
    pub async fn wait(mut self) -> Job {
        if self.rx.wait_for(Job::is_terminal).await.is_err() {
            // record removed; the last value is all we get
            debug!("Job {} dropped before finishing", self.id);
        }
        let job = self.rx.borrow().clone();
        job
    }
}

/// Number of jobs per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunnerSummary {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunnerSummary {
    pub fn total(&self) -> usize {
        self.queued + self.running + self.completed + self.failed + self.cancelled
    }
}

impl JobRunner {
    /// Create a runner. A pool size of zero is treated as one.
    pub fn new(pool_size: usize, extractor: Arc<dyn Extractor>) -> Self {
        let state = RunnerState {
            jobs: HashMap::new(),
            order: Vec::new(),
            pending: VecDeque::new(),
            active: 0,
            pool_size: pool_size.max(1),
            events: EventBus::new(EVENT_CHANNEL_CAPACITY),
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                extractor,
            }),
        }
    }

    pub fn extractor(&self) -> Arc<dyn Extractor> {
        Arc::clone(&self.inner.extractor)
    }

    pub async fn pool_size(&self) -> usize {
        self.inner.state.lock().await.pool_size
    }

    /// Change the number of workers. Shrinking never interrupts running jobs.
    pub async fn set_pool_size(&self, pool_size: usize) {
        let mut guard = self.inner.state.lock().await;
        guard.pool_size = pool_size.max(1);
        info!("Worker pool size set to {}", guard.pool_size);
        Inner::pump(&self.inner, &mut guard);
    }

    /// Subscribe to job events from now on
    pub async fn subscribe(&self) -> mpsc::Receiver<JobEvent> {
        self.inner.state.lock().await.events.subscribe()
    }

    /// Queue a download. Nothing is recorded when the URL is rejected.
    pub async fn submit(&self, url: &str, options: JobOptions) -> Result<JobHandle, DownloadError> {
        let job = Job::new(url, options)?;
        let id = job.id;
        let (tx, rx) = watch::channel(job.clone());

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        state.events.publish(JobEvent::Queued {
            job_id: id,
            url: job.url.clone(),
        });
        state.jobs.insert(
            id,
            JobRecord {
                job,
                cancel: CancellationToken::new(),
                watch: tx,
            },
        );
        state.order.push(id);
        state.pending.push_back(id);
        info!("Added job {} to queue", id);

        Inner::pump(&self.inner, state);

        Ok(JobHandle { id, rx })
    }

    /// Resubmit the URL and options of a finished job as a new job
    pub async fn retry(&self, id: JobId) -> Result<JobHandle> {
        let (url, options) = {
            let state = self.inner.state.lock().await;
            let record = state.jobs.get(&id).ok_or(RunnerError::JobNotFound(id))?;
            if !record.job.is_terminal() {
                return Err(RunnerError::JobNotFinished(id).into());
            }
            (record.job.url.clone(), record.job.options.clone())
        };

        info!("Retrying job {}", id);
        Ok(self.submit(&url, options).await?)
    }

    /// Cancel a job and return its resulting status.
    ///
    /// Finished jobs are left alone.
    pub async fn cancel(&self, id: JobId) -> Result<JobStatus> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let record = state.jobs.get_mut(&id).ok_or(RunnerError::JobNotFound(id))?;

        match record.job.status {
            JobStatus::Queued => {
                state.pending.retain(|pending| *pending != id);
                info!("Cancelled queued job {}", id);
            }
            JobStatus::Running => {
                record.cancel.cancel();
                info!("Cancelled running job {}", id);
            }
            status => return Ok(status),
        }

        if record.job.cancel() {
            record.publish_state();
            state.events.publish(JobEvent::finished(&record.job));
        }
        Ok(record.job.status)
    }

    pub async fn job(&self, id: JobId) -> Option<Job> {
        let state = self.inner.state.lock().await;
        state.jobs.get(&id).map(|record| record.job.clone())
    }

    /// All jobs in submission order
    pub async fn jobs(&self) -> Vec<Job> {
        let state = self.inner.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .map(|record| record.job.clone())
            .collect()
    }

    /// A handle for an existing job
    pub async fn handle(&self, id: JobId) -> Option<JobHandle> {
        let state = self.inner.state.lock().await;
        state.jobs.get(&id).map(|record| JobHandle {
            id,
            rx: record.watch.subscribe(),
        })
    }

    /// Wait for a job to finish
    pub async fn wait(&self, handle: JobHandle) -> Job {
        handle.wait().await
    }

    pub async fn summary(&self) -> RunnerSummary {
        let state = self.inner.state.lock().await;
        let mut summary = RunnerSummary::default();
        for record in state.jobs.values() {
            match record.job.status {
                JobStatus::Queued => summary.queued += 1,
                JobStatus::Running => summary.running += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// Forget a finished job
    pub async fn remove(&self, id: JobId) -> Result<Job> {
        let mut state = self.inner.state.lock().await;
        let record = state.jobs.get(&id).ok_or(RunnerError::JobNotFound(id))?;
        if !record.job.is_terminal() {
            return Err(RunnerError::JobNotFinished(id).into());
        }

        state.order.retain(|existing| *existing != id);
        let record = state.jobs.remove(&id).ok_or(RunnerError::JobNotFound(id))?;
        debug!("Removed job {}", id);
        Ok(record.job)
    }

    /// Forget every finished job and return how many were removed
    pub async fn clear_finished(&self) -> usize {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let before = state.jobs.len();
        state.jobs.retain(|_, record| !record.job.is_terminal());
        let jobs = &state.jobs;
        state.order.retain(|id| jobs.contains_key(id));

        let removed = before - state.jobs.len();
        info!("Cleared {} finished jobs", removed);
        removed
    }
}

impl Inner {
    /// Start queued jobs while worker slots are free
    fn pump(inner: &Arc<Inner>, state: &mut RunnerState) {
        while state.active < state.pool_size {
            let Some(id) = state.pending.pop_front() else {
                break;
            };
            let Some(record) = state.jobs.get_mut(&id) else {
                continue;
            };
            if !record.job.start() {
                continue;
            }
            record.publish_state();

            let request = FetchRequest::new(record.job.url.clone(), record.job.options.clone());
            let cancel = record.cancel.clone();
            state.active += 1;
            state.events.publish(JobEvent::Started { job_id: id });
            info!("Started job {} ({})", id, request.url);

            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                Inner::run_job(inner, id, request, cancel).await;
            });
        }
    }

    async fn run_job(
        inner: Arc<Inner>,
        id: JobId,
        request: FetchRequest,
        cancel: CancellationToken,
    ) {
        let outcome = inner.execute(id, &request, cancel).await;

        let mut guard = inner.state.lock().await;
        let state = &mut *guard;
        state.active = state.active.saturating_sub(1);

        if let Some(record) = state.jobs.get_mut(&id) {
            match &outcome {
                Ok(path) => info!("Job {} completed: {}", id, path.display()),
                Err(DownloadError::Cancelled) => info!("Job {} was cancelled", id),
                Err(e) => error!("Job {} failed: {}", id, e),
            }
            if record.job.finish(outcome) {
                record.publish_state();
                if record.job.status == JobStatus::Completed {
                    state.events.publish(JobEvent::progress(&record.job));
                }
                state.events.publish(JobEvent::finished(&record.job));
            } else {
                debug!("Job {} already finished, ignoring worker result", id);
            }
        }

        Inner::pump(&inner, state);
    }

    async fn execute(
        &self,
        id: JobId,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let output_dir = &request.options.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DownloadError::from_io(&e, output_dir))?;

        let (progress_tx, mut progress_rx) =
            mpsc::channel::<FetchProgress>(PROGRESS_CHANNEL_CAPACITY);
        let extractor = Arc::clone(&self.extractor);
        let fetch_request = request.clone();
        let mut fetch = tokio::spawn(async move {
            extractor.fetch(&fetch_request, progress_tx, cancel).await
        });

        let joined = loop {
            tokio::select! {
                biased;
                Some(progress) = progress_rx.recv() => self.record_progress(id, &progress).await,
                joined = &mut fetch => break joined,
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            self.record_progress(id, &progress).await;
        }

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                warn!("Extractor panicked while running job {}", id);
                Err(DownloadError::AdapterFailure("extractor panicked".to_string()))
            }
            Err(_) => Err(DownloadError::Cancelled),
        }
    }

    async fn record_progress(&self, id: JobId, progress: &FetchProgress) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Some(record) = state.jobs.get_mut(&id) {
            if record.job.apply_progress(progress) {
                record.publish_state();
                state.events.publish(JobEvent::progress(&record.job));
            }
        }
    }
}
