mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::{DAY, Fixture, assert_board_consistent};
use shiftmatch_engine::{
    EngineConfig, InvitationResponse, MatchError, NewWorker, Rejection, RetryPolicy,
};

fn contended_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy::exponential(64, Duration::from_millis(1), Duration::from_millis(8)),
        ..EngineConfig::default()
    }
}

#[test]
fn concurrent_accepts_never_overfill_a_job() {
    let fx = Fixture::with_config(contended_config());
    let workers: Vec<_> = (0..8)
        .map(|i| fx.worker_with_slot(&format!("Worker{i}"), DAY, "Morning"))
        .collect();
    let job = fx.post_job(DAY, "Morning", 2);
    assert_eq!(job.invited_workers.len(), 8);

    let barrier = Arc::new(Barrier::new(workers.len()));
    let handles: Vec<_> = workers
        .iter()
        .map(|&worker_id| {
            let engine = Arc::clone(&fx.engine);
            let org = fx.org.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let accept = InvitationResponse::Accept;
                engine.respond_to_invitation(&org, job.job_id, worker_id, accept)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 2);
    for err in results.into_iter().filter_map(Result::err) {
        assert_eq!(err, MatchError::Rejected(Rejection::JobAlreadyFilled));
    }

    let job = fx.job(job.job_id);
    assert_eq!(job.workers.len(), 2);
    assert!(job.job_status);
    assert_eq!(job.invited_workers.len(), 6);
    assert_board_consistent(&fx);
}

#[test]
fn cascades_and_accepts_interleave_consistently() {
    let fx = Fixture::with_config(contended_config());
    let workers: Vec<_> = (0..6)
        .map(|i| fx.worker_with_slot(&format!("Worker{i}"), DAY, "Morning"))
        .collect();
    let jobs: Vec<_> = (0..3).map(|_| fx.post_job(DAY, "Morning", 2).job_id).collect();

    let handles: Vec<_> = workers
        .iter()
        .enumerate()
        .map(|(i, &worker_id)| {
            let engine = Arc::clone(&fx.engine);
            let org = fx.org.clone();
            let jobs = jobs.clone();
            thread::spawn(move || {
                let job_id = jobs[i % jobs.len()];
                let accept = InvitationResponse::Accept;
                let _ = engine.respond_to_invitation(&org, job_id, worker_id, accept);
                if i % 2 == 0 {
                    engine.cancel_worker_shift(&org, worker_id, DAY, "Morning").map(|_| ())
                } else {
                    Ok(())
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap().unwrap();
    }

    for (i, &worker_id) in workers.iter().enumerate() {
        let referenced = fx
            .engine
            .jobs_for_scope(&fx.org)
            .unwrap()
            .iter()
            .any(|job| job.references(worker_id));
        if i % 2 == 0 {
            assert!(!referenced, "cancelled worker {worker_id} still referenced");
        }
    }
    assert_board_consistent(&fx);
}

#[test]
fn concurrent_registrations_keep_emails_unique() {
    let fx = Fixture::with_config(contended_config());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&fx.engine);
            let org = fx.org.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.register_worker(
                    &org,
                    NewWorker {
                        name: format!("Ada {i}"),
                        email: "ada@example.com".to_string(),
                        ..NewWorker::default()
                    },
                )
            })
        })
        .collect();

    let ok = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(ok, 1);
    assert_eq!(fx.engine.pending_workers(&fx.org).unwrap().len(), 1);
}
