use std::sync::Arc;

use anyhow::Context;
use shiftmatch_engine::{
    ActorScope, EngineConfig, InvitationResponse, MatchingEngine, NewJob, NewWorker,
    OrganizationScope, TracingNotifier,
};

fn main() -> anyhow::Result<()> {
    shiftmatch_observability::init();

    let config = EngineConfig::from_env();
    tracing::info!(?config, "starting shiftmatch demo");

    let engine = MatchingEngine::in_memory(config, Arc::new(TracingNotifier));
    let scope = OrganizationScope::new("DEMO-ORG").context("demo scope")?;
    let org = ActorScope::new(scope);

    let mut crew = Vec::new();
    let roster = [
        ("Ada", "ada@example.com"),
        ("Grace", "grace@example.com"),
        ("Linus", "linus@example.com"),
    ];
    for (name, email) in roster {
        let worker = engine.register_worker(
            &org,
            NewWorker {
                name: name.to_string(),
                email: email.to_string(),
                ..NewWorker::default()
            },
        )?;
        engine.approve_worker(&org, worker.worker_id)?;
        crew.push(worker.worker_id);
    }

    engine.add_availability(&org, crew[0], "2024-06-01", "Morning")?;
    engine.add_availability(&org, crew[1], "2024-06-01", "Morning")?;

    let job = engine.create_job(
        &org,
        NewJob {
            date: "2024-06-01".to_string(),
            shift: "Morning".to_string(),
            workers_required: 2,
            title: "Warehouse intake".to_string(),
            location: Some("Dock 4".to_string()),
            ..NewJob::default()
        },
    )?;

    engine.respond_to_invitation(&org, job.job_id, crew[0], InvitationResponse::Accept)?;
    engine.respond_to_invitation(&org, job.job_id, crew[1], InvitationResponse::Accept)?;

    let report = engine.cancel_worker_shift(&org, crew[1], "2024-06-01", "Morning")?;
    tracing::info!(affected = report.affected_job_count, "cascade finished");

    for view in engine.jobs_for_scope(&org)? {
        println!("{}", serde_json::to_string_pretty(&view).context("render job")?);
    }

    Ok(())
}
