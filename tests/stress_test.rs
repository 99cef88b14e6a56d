//! Stress tests for the job runner
//!
//! Many jobs are submitted while cancels land at random points. Afterwards:
//! - no more than `pool_size` fetches ever ran at once
//! - every job ended in exactly one terminal state
//! - cancelled jobs that were still queued never reached the extractor

mod common;

use common::{eventually, wait_for, Behavior, StubExtractor};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use videodownloader::queue::{JobEvent, JobId, JobOptions, JobRunner, JobStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_test_random_cancels() {
    const POOL: usize = 3;
    const JOBS: usize = 40;

    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Block));
    let runner = JobRunner::new(POOL, stub.clone());
    let mut events = runner.subscribe().await;

    let options = JobOptions {
        output_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let mut handles = Vec::new();
    for n in 0..JOBS {
        let url = format!("https://example.com/watch?v={}", n);
        handles.push(runner.submit(&url, options.clone()).await.unwrap());
    }

    let mut ids: Vec<JobId> = handles.iter().map(|h| h.id()).collect();
    ids.shuffle(&mut rand::thread_rng());
    let to_cancel: Vec<JobId> = ids.into_iter().take(JOBS / 2).collect();

    let cancel_runner = runner.clone();
    let canceller = tokio::spawn(async move {
        for id in to_cancel {
            let delay = rand::thread_rng().gen_range(0..3);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            cancel_runner.cancel(id).await.expect("known job");
        }
    });

    // trickle releases so running jobs finish while cancels arrive
    for _ in 0..JOBS {
        stub.release(1);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    canceller.await.expect("canceller");
    stub.release(JOBS);

    let mut finished = Vec::new();
    for handle in handles {
        finished.push(wait_for(handle).await);
    }
    // workers of cancelled jobs may still be winding down
    let expected_fetches = JOBS - never_started(&finished);
    eventually(|| stub.fetch_count() == expected_fetches).await;
    eventually(|| stub.running() == 0).await;

    assert!(stub.max_running() <= POOL, "ran {} at once", stub.max_running());
    assert!(finished.iter().all(|job| job.is_terminal()));

    let summary = runner.summary().await;
    assert_eq!(summary.total(), JOBS);
    assert_eq!(summary.queued + summary.running, 0);
    assert_eq!(summary.completed + summary.cancelled, JOBS);

    // exactly one Finished event per job
    let mut finished_events: HashMap<JobId, usize> = HashMap::new();
    let drain = async {
        while let Some(event) = events.recv().await {
            if let JobEvent::Finished { job_id, .. } = event {
                *finished_events.entry(job_id).or_default() += 1;
                if finished_events.len() == JOBS {
                    break;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), drain)
        .await
        .expect("all finished events delivered");
    assert!(finished_events.values().all(|count| *count == 1));
}

fn never_started(jobs: &[videodownloader::Job]) -> usize {
    jobs.iter()
        .filter(|job| job.status == JobStatus::Cancelled && job.started_at.is_none())
        .count()
}

#[tokio::test]
async fn stress_test_many_successes_respect_pool() {
    let dir = tempdir().expect("temp dir");
    let stub = Arc::new(StubExtractor::new(Behavior::Succeed));
    let runner = JobRunner::new(4, stub.clone());

    let mut handles = Vec::new();
    for n in 0..100 {
        let options = JobOptions {
            output_dir: dir.path().join(format!("batch{}", n % 5)),
            ..Default::default()
        };
        let url = format!("https://example.com/watch?v={}", n);
        handles.push(runner.submit(&url, options).await.unwrap());
    }

    for handle in handles {
        let job = wait_for(handle).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100.0);
    }
    assert!(stub.max_running() <= 4);
    assert_eq!(runner.clear_finished().await, 100);
}
