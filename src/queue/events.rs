//! Notifications emitted by the job runner

use crate::queue::job::{Job, JobId, JobStatus};
use crate::utils::error::DownloadError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::debug;

/// Events that describe changes in job state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was accepted
    Queued { job_id: JobId, url: String },
    /// A worker picked the job up
    Started { job_id: JobId },
    /// The adapter reported progress
    Progress {
        job_id: JobId,
        percent: f64,
        speed: Option<f64>,
        eta: Option<u64>,
    },
    /// The job reached its terminal state; sent exactly once per job
    Finished {
        job_id: JobId,
        status: JobStatus,
        result_path: Option<PathBuf>,
        error: Option<DownloadError>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Queued { job_id, .. }
            | JobEvent::Started { job_id }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Finished { job_id, .. } => *job_id,
        }
    }

    pub(crate) fn progress(job: &Job) -> Self {
        JobEvent::Progress {
            job_id: job.id,
            percent: job.progress_percent,
            speed: job.speed,
            eta: job.eta,
        }
    }

    pub(crate) fn finished(job: &Job) -> Self {
        JobEvent::Finished {
            job_id: job.id,
            status: job.status,
            result_path: job.result_path.clone(),
            error: job.error.clone(),
        }
    }

    fn is_droppable(&self) -> bool {
        matches!(self, JobEvent::Progress { .. })
    }
}

/// Fan-out of job events to any number of bounded subscriber channels.
///
/// Each subscriber is fed by its own forwarding task through an unbounded
/// outbox, so publishing never waits and events reach a subscriber in the
/// order they were published. When a subscriber is behind, progress events
/// are dropped for it; lifecycle events wait for room.
#[derive(Debug)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<JobEvent>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Add a subscriber. Must be called from within a tokio runtime.
    pub fn subscribe(&mut self) -> mpsc::Receiver<JobEvent> {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(self.capacity);
        tokio::spawn(forward(outbox_rx, tx));
        self.subscribers.push(outbox_tx);
        rx
    }

    pub fn publish(&mut self, event: JobEvent) {
        self.subscribers.retain(|outbox| !outbox.is_closed());

        for outbox in &self.subscribers {
            // a failed send means the forwarder just stopped; pruned next time
            let _ = outbox.send(event.clone());
        }
    }
}

/// Move events from a subscriber's outbox into its bounded channel, in order
async fn forward(mut outbox: mpsc::UnboundedReceiver<JobEvent>, tx: mpsc::Sender<JobEvent>) {
    loop {
        let event = tokio::select! {
            _ = tx.closed() => break,
            event = outbox.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if event.is_droppable() {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    debug!("Subscriber is behind, dropping progress for {}", event.job_id());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        } else if tx.send(event).await.is_err() {
            break;
        }
    }
}
