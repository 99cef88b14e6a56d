//! Job runner behaviour against a stub extractor: pool bound, ordering,
//! cancellation, progress and terminal states.

mod common;

use common::{eventually, wait_for, Behavior, StubExtractor};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use videodownloader::queue::{JobEvent, JobOptions, JobRunner, JobStatus};
use videodownloader::DownloadError;

fn options(dir: &TempDir) -> JobOptions {
    JobOptions {
        output_dir: dir.path().join("out"),
        ..Default::default()
    }
}

fn url(n: usize) -> String {
    format!("https://example.com/watch?v={}", n)
}

#[tokio::test]
async fn test_execution_concurrency_limit() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Block));
    let runner = JobRunner::new(2, stub.clone());

    let mut handles = Vec::new();
    for n in 0..3 {
        handles.push(runner.submit(&url(n), options(&dir)).await.unwrap());
    }

    eventually(|| stub.running() == 2).await;
    let summary = runner.summary().await;
    assert_eq!(summary.running, 2);
    assert_eq!(summary.queued, 1);
    assert_eq!(handles[2].snapshot().status, JobStatus::Queued);

    stub.release(3);
    for handle in handles {
        assert_eq!(wait_for(handle).await.status, JobStatus::Completed);
    }
    assert!(stub.max_running() <= 2, "ran {} at once", stub.max_running());
    assert_eq!(runner.summary().await.completed, 3);
}

#[tokio::test]
async fn test_jobs_start_in_submission_order() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Block));
    let runner = JobRunner::new(1, stub.clone());

    let mut handles = Vec::new();
    for n in 0..4 {
        handles.push(runner.submit(&url(n), options(&dir)).await.unwrap());
    }
    for handle in handles {
        stub.release(1);
        wait_for(handle).await;
    }

    let started: Vec<String> = stub.requests().into_iter().map(|r| r.url).collect();
    let expected: Vec<String> = (0..4).map(url).collect();
    assert_eq!(started, expected);

    let listed: Vec<String> = runner.jobs().await.into_iter().map(|j| j.url).collect();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn test_cancel_queued_job_never_reaches_extractor() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Block));
    let runner = JobRunner::new(1, stub.clone());

    let first = runner.submit(&url(1), options(&dir)).await.unwrap();
    let second = runner.submit(&url(2), options(&dir)).await.unwrap();
    eventually(|| stub.running() == 1).await;

    assert_eq!(runner.cancel(second.id()).await.unwrap(), JobStatus::Cancelled);
    stub.release(1);

    assert_eq!(wait_for(first).await.status, JobStatus::Completed);
    let cancelled = wait_for(second).await;
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.started_at.is_none());
    assert_eq!(stub.fetch_count(), 1);
}

#[tokio::test]
async fn test_cancel_running_job() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Block));
    let runner = JobRunner::new(1, stub.clone());

    let handle = runner.submit(&url(1), options(&dir)).await.unwrap();
    eventually(|| stub.running() == 1).await;

    assert_eq!(runner.cancel(handle.id()).await.unwrap(), JobStatus::Cancelled);
    let job = wait_for(handle).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.result_path.is_none());
    assert!(job.error.is_none());

    // the adapter observes the token and returns
    eventually(|| stub.running() == 0).await;

    // the freed slot is used by the next job
    stub.release(1);
    let next = runner.submit(&url(2), options(&dir)).await.unwrap();
    assert_eq!(wait_for(next).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_completion_reported_once() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(
        StubExtractor::new(Behavior::Succeed).with_progress(vec![10.0, 35.0, 20.0, 80.0]),
    );
    let runner = JobRunner::new(1, stub.clone());
    let mut events = runner.subscribe().await;

    let handle = runner.submit(&url(1), options(&dir)).await.unwrap();
    let id = handle.id();
    let job = wait_for(handle).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress_percent, 100.0);
    let path = job.result_path.expect("result path");
    assert!(path.starts_with(dir.path().join("out")));
    assert!(dir.path().join("out").is_dir(), "output directory is created");

    // a late cancel leaves the finished job alone
    assert_eq!(runner.cancel(id).await.unwrap(), JobStatus::Completed);

    let mut seen = Vec::new();
    let collect = async {
        while let Some(event) = events.recv().await {
            assert_eq!(event.job_id(), id);
            let done = matches!(event, JobEvent::Finished { .. });
            seen.push(event);
            if done {
                break;
            }
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(10), collect)
        .await
        .expect("finished event delivered");

    assert!(matches!(seen.first(), Some(JobEvent::Queued { .. })));
    assert!(matches!(seen.get(1), Some(JobEvent::Started { .. })));
    assert!(matches!(
        seen.last(),
        Some(JobEvent::Finished {
            status: JobStatus::Completed,
            ..
        })
    ));

    let finished = seen
        .iter()
        .filter(|e| matches!(e, JobEvent::Finished { .. }))
        .count();
    assert_eq!(finished, 1);

    let percents: Vec<f64> = seen
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    // a completed job always reports full progress before it finishes
    assert_eq!(percents.last(), Some(&100.0));
    assert!(matches!(
        seen[seen.len() - 2],
        JobEvent::Progress { percent, .. } if percent == 100.0
    ));
}

#[tokio::test]
async fn test_failure_records_classified_error() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Fail(DownloadError::NetworkFailure(
        "connection reset".into(),
    ))));
    let runner = JobRunner::new(1, stub);

    let handle = runner.submit(&url(1), options(&dir)).await.unwrap();
    let job = wait_for(handle).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result_path.is_none());
    let error = job.error.expect("error recorded");
    assert!(error.is_retryable());
    assert!(job.progress_percent < 100.0);
}

#[tokio::test]
async fn test_retry_resubmits_same_request() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Fail(DownloadError::NetworkFailure(
        "timed out".into(),
    ))));
    let runner = JobRunner::new(1, stub.clone());

    let first = wait_for(runner.submit(&url(7), options(&dir)).await.unwrap()).await;
    assert_eq!(first.status, JobStatus::Failed);

    let retried = runner.retry(first.id).await.expect("retry");
    assert_ne!(retried.id(), first.id);
    let second = wait_for(retried).await;
    assert_eq!(second.url, first.url);
    assert_eq!(second.options, first.options);
    assert_eq!(stub.fetch_count(), 2);
    assert_eq!(runner.jobs().await.len(), 2);
}

#[tokio::test]
async fn test_retry_of_unfinished_job_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Block));
    let runner = JobRunner::new(1, stub.clone());

    let handle = runner.submit(&url(1), options(&dir)).await.unwrap();
    assert!(runner.retry(handle.id()).await.is_err());
    assert!(runner.remove(handle.id()).await.is_err());

    stub.release(1);
    wait_for(handle).await;
}

#[tokio::test]
async fn test_unusable_output_dir_fails_before_fetch() {
    let dir = tempdir().expect("temp dir");
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").expect("write file");

    let stub = Arc::new(StubExtractor::new(Behavior::Succeed));
    let runner = JobRunner::new(1, stub.clone());
    let job_options = JobOptions {
        output_dir: blocker.join("out"),
        ..Default::default()
    };

    let job = wait_for(runner.submit(&url(1), job_options).await.unwrap()).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
    assert_eq!(stub.fetch_count(), 0);
}

#[tokio::test]
async fn test_panicking_extractor_fails_job_and_frees_slot() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Panic));
    let runner = JobRunner::new(1, stub.clone());

    let first = wait_for(runner.submit(&url(1), options(&dir)).await.unwrap()).await;
    assert_eq!(first.status, JobStatus::Failed);
    assert!(matches!(first.error, Some(DownloadError::AdapterFailure(_))));

    let second = wait_for(runner.submit(&url(2), options(&dir)).await.unwrap()).await;
    assert_eq!(second.status, JobStatus::Failed);
    assert_eq!(stub.fetch_count(), 2);
}

#[tokio::test]
async fn test_growing_pool_starts_queued_jobs() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Block));
    let runner = JobRunner::new(1, stub.clone());

    let mut handles = Vec::new();
    for n in 0..3 {
        handles.push(runner.submit(&url(n), options(&dir)).await.unwrap());
    }
    eventually(|| stub.running() == 1).await;

    runner.set_pool_size(3).await;
    eventually(|| stub.running() == 3).await;

    stub.release(3);
    for handle in handles {
        assert_eq!(wait_for(handle).await.status, JobStatus::Completed);
    }
}

#[tokio::test]
async fn test_invalid_url_creates_no_job() {
    let stub = Arc::new(StubExtractor::new(Behavior::Succeed));
    let runner = JobRunner::new(1, stub.clone());

    for bad in ["", "   ", "not a url", "ftp://example.com/file"] {
        let result = runner.submit(bad, JobOptions::default()).await;
        assert!(matches!(result, Err(DownloadError::InvalidInput(_))), "{:?}", bad);
    }
    assert!(runner.jobs().await.is_empty());
    assert_eq!(stub.fetch_count(), 0);
}
