use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use shiftmatch_engine::{
    ActorScope, EngineConfig, MatchingEngine, NewJob, NewWorker, OrganizationScope, RecordingNotifier,
};

fn staffed_engine(workers: usize) -> (MatchingEngine, ActorScope) {
    let engine = MatchingEngine::in_memory(EngineConfig::default(), Arc::new(RecordingNotifier::new()));
    let org = ActorScope::new(OrganizationScope::new("BENCH01").unwrap());

    for i in 0..workers {
        let worker = engine
            .register_worker(
                &org,
                NewWorker {
                    name: format!("Worker {i}"),
                    email: format!("worker{i}@example.com"),
                    ..NewWorker::default()
                },
            )
            .unwrap();
        engine.approve_worker(&org, worker.worker_id).unwrap();
        // Every other worker matches the benchmarked slot.
        let day = if i % 2 == 0 { "2024-06-01" } else { "2024-06-02" };
        engine.add_availability(&org, worker.worker_id, day, "Morning").unwrap();
    }

    (engine, org)
}

fn new_job(date: &str) -> NewJob {
    NewJob {
        date: date.to_string(),
        shift: "Morning".to_string(),
        workers_required: 3,
        title: "Bench job".to_string(),
        ..NewJob::default()
    }
}

fn bench_create_job(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_job_with_selection");
    group.sample_size(20);

    for workers in [10usize, 100, 250] {
        let (engine, org) = staffed_engine(workers);

        group.bench_with_input(BenchmarkId::new("targeted", workers), &workers, |b, _| {
            b.iter(|| engine.create_job(&org, black_box(new_job("2024-06-01"))).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("broadcast", workers), &workers, |b, _| {
            b.iter(|| engine.create_job(&org, black_box(new_job("2024-07-15"))).unwrap());
        });
    }

    group.finish();
}

fn bench_shift_lookup(c: &mut Criterion) {
    let (engine, org) = staffed_engine(500);

    c.bench_function("workers_for_shift_500", |b| {
        b.iter(|| {
            engine
                .workers_for_shift(&org, black_box("2024-06-01"), "Morning")
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_create_job, bench_shift_lookup);
criterion_main!(benches);
