mod common;

use common::{DAY, Fixture, new_job, org};
use shiftmatch_engine::{
    ActorScope, InvitationResponse, MatchError, NewWorker, OwnerKind, WorkerUpdate,
};

#[test]
fn candidate_selection_never_crosses_scopes() {
    let fx = Fixture::new();
    let other = org("COMP2");
    let outsider = fx
        .engine
        .register_worker(
            &other,
            NewWorker {
                name: "Olga".to_string(),
                email: "olga@example.com".to_string(),
                ..NewWorker::default()
            },
        )
        .unwrap()
        .worker_id;
    fx.engine.approve_worker(&other, outsider).unwrap();
    fx.engine.add_availability(&other, outsider, DAY, "Morning").unwrap();
    let insider = fx.approved_worker("Ada");

    let job = fx.post_job(DAY, "Morning", 1);

    assert_eq!(job.invited_workers, vec![insider]);
    assert!(fx.engine.workers_for_shift(&fx.org, DAY, "Morning").unwrap().is_empty());
    assert_eq!(fx.engine.workers_for_shift(&other, DAY, "Morning").unwrap().len(), 1);
}

#[test]
fn foreign_entities_are_unauthorized() {
    let fx = Fixture::new();
    let w = fx.worker_with_slot("Ada", DAY, "Morning");
    let job = fx.post_job(DAY, "Morning", 1);
    let other = org("COMP2");

    assert_eq!(fx.engine.get_job(&other, job.job_id).unwrap_err(), MatchError::Unauthorized);
    assert_eq!(fx.engine.get_worker(&other, w).unwrap_err(), MatchError::Unauthorized);
    assert_eq!(
        fx.engine
            .respond_to_invitation(&other, job.job_id, w, InvitationResponse::Accept)
            .unwrap_err(),
        MatchError::Unauthorized
    );
    assert_eq!(
        fx.engine.cancel_worker_shift(&other, w, DAY, "Morning").unwrap_err(),
        MatchError::Unauthorized
    );
    assert_eq!(fx.engine.delete_worker(&other, w).unwrap_err(), MatchError::Unauthorized);
    assert_eq!(fx.engine.delete_job(&other, job.job_id).unwrap_err(), MatchError::Unauthorized);
    let rename = WorkerUpdate {
        name: Some("Mallory".to_string()),
        ..WorkerUpdate::default()
    };
    assert_eq!(
        fx.engine.update_worker_profile(&other, w, rename).unwrap_err(),
        MatchError::Unauthorized
    );
    assert!(fx.engine.jobs_for_scope(&other).unwrap().is_empty());

    // Nothing changed for the owner.
    assert_eq!(fx.job(job.job_id).invited_workers, vec![w]);
    assert_eq!(fx.worker(w).availability.len(), 1);
}

#[test]
fn foreign_workers_cannot_be_invited() {
    let fx = Fixture::new();
    let job = fx.post_job(DAY, "Morning", 1);

    let other = org("COMP2");
    let outsider = fx
        .engine
        .register_worker(
            &other,
            NewWorker {
                name: "Olga".to_string(),
                email: "olga@example.com".to_string(),
                ..NewWorker::default()
            },
        )
        .unwrap()
        .worker_id;
    fx.engine.approve_worker(&other, outsider).unwrap();

    let err = fx.engine.invite_workers(&fx.org, job.job_id, &[outsider]).unwrap_err();
    assert_eq!(err, MatchError::Unauthorized);
    assert!(fx.job(job.job_id).invited_workers.is_empty());
}

#[test]
fn a_missing_scope_is_unauthorized_everywhere() {
    let fx = Fixture::new();
    let w = fx.worker_with_slot("Ada", DAY, "Morning");
    let job = fx.post_job(DAY, "Morning", 1);
    let anonymous = ActorScope::anonymous();

    let job_input = new_job(DAY, "Morning", 1);
    assert_eq!(
        fx.engine.create_job(&anonymous, job_input).unwrap_err(),
        MatchError::Unauthorized
    );
    assert_eq!(
        fx.engine.workers_for_shift(&anonymous, DAY, "Morning").unwrap_err(),
        MatchError::Unauthorized
    );
    assert_eq!(
        fx.engine
            .respond_to_invitation(&anonymous, job.job_id, w, InvitationResponse::Decline)
            .unwrap_err(),
        MatchError::Unauthorized
    );
    assert_eq!(fx.engine.delete_worker(&anonymous, w).unwrap_err(), MatchError::Unauthorized);

    let blank = ActorScope::for_owner(OwnerKind::Individual, "   ");
    assert_eq!(fx.engine.jobs_for_scope(&blank).unwrap_err(), MatchError::Unauthorized);
    let err = fx.engine.get_job(&anonymous, job.job_id).unwrap_err();
    assert_eq!(err.to_json()["error"], "unauthorized");
}

#[test]
fn individual_and_company_owners_share_one_scope() {
    let fx = Fixture::new();
    let job = fx.post_job(DAY, "Morning", 1);

    let company = ActorScope::for_owner(OwnerKind::Company, "COMP1");
    assert_eq!(fx.engine.get_job(&company, job.job_id).unwrap().job_id, job.job_id);
}

#[test]
fn the_same_email_may_exist_in_two_scopes() {
    let fx = Fixture::new();
    fx.pending_worker("Ada");

    let other = org("COMP2");
    let registered = fx.engine.register_worker(
        &other,
        NewWorker {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            ..NewWorker::default()
        },
    );
    assert!(registered.is_ok());
}
