#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use shiftmatch_core::{AggregateId, ExpectedVersion};
use shiftmatch_engine::{
    ActorScope, EngineConfig, EnvelopeBus, InvitationResponse, JobId, JobView, MatchError,
    MatchingEngine, NewJob, NewWorker, OrganizationScope, RecordingNotifier, WorkerId, WorkerView,
};
use shiftmatch_infra::{
    EventStore, EventStoreError, InMemoryActivityLog, InMemoryEventStore, StoredEvent,
    UncommittedEvent,
};

pub const DAY: &str = "2024-06-01";

pub struct Fixture<S = Arc<InMemoryEventStore>> {
    pub engine: Arc<MatchingEngine<S>>,
    pub notifier: Arc<RecordingNotifier>,
    pub org: ActorScope,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = Arc::new(MatchingEngine::in_memory(config, notifier.clone()));
        Self {
            engine,
            notifier,
            org: org("COMP1"),
        }
    }
}

impl Fixture<Arc<InterceptingStore>> {
    /// Engine whose store can run code in the middle of chosen appends.
    pub fn intercepted(config: EngineConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = MatchingEngine::new(
            config,
            Arc::new(InterceptingStore::default()),
            Arc::new(EnvelopeBus::new()),
            notifier.clone(),
            Arc::new(InMemoryActivityLog::new()),
        );
        Self {
            engine: Arc::new(engine),
            notifier,
            org: org("COMP1"),
        }
    }

    pub fn store(&self) -> &InterceptingStore {
        self.engine.store()
    }
}

impl<S: EventStore> Fixture<S> {
    /// Registered but not approved.
    pub fn pending_worker(&self, name: &str) -> WorkerId {
        self.engine
            .register_worker(
                &self.org,
                NewWorker {
                    name: name.to_string(),
                    email: format!("{}@example.com", name.to_lowercase()),
                    ..NewWorker::default()
                },
            )
            .unwrap()
            .worker_id
    }

    pub fn approved_worker(&self, name: &str) -> WorkerId {
        let id = self.pending_worker(name);
        self.engine.approve_worker(&self.org, id).unwrap();
        id
    }

    pub fn worker_with_slot(&self, name: &str, date: &str, shift: &str) -> WorkerId {
        let id = self.approved_worker(name);
        self.engine.add_availability(&self.org, id, date, shift).unwrap();
        id
    }

    pub fn post_job(&self, date: &str, shift: &str, workers_required: u32) -> JobView {
        self.engine
            .create_job(&self.org, new_job(date, shift, workers_required))
            .unwrap()
    }

    pub fn accept(&self, job_id: JobId, worker_id: WorkerId) -> Result<JobView, MatchError> {
        self.engine
            .respond_to_invitation(&self.org, job_id, worker_id, InvitationResponse::Accept)
    }

    pub fn decline(&self, job_id: JobId, worker_id: WorkerId) -> Result<JobView, MatchError> {
        self.engine
            .respond_to_invitation(&self.org, job_id, worker_id, InvitationResponse::Decline)
    }

    pub fn job(&self, job_id: JobId) -> JobView {
        self.engine.get_job(&self.org, job_id).unwrap()
    }

    pub fn worker(&self, worker_id: WorkerId) -> WorkerView {
        self.engine.get_worker(&self.org, worker_id).unwrap()
    }
}

pub fn org(code: &str) -> ActorScope {
    ActorScope::new(OrganizationScope::new(code).unwrap())
}

pub fn new_job(date: &str, shift: &str, workers_required: u32) -> NewJob {
    NewJob {
        date: date.to_string(),
        shift: shift.to_string(),
        workers_required,
        title: "Warehouse intake".to_string(),
        ..NewJob::default()
    }
}

/// Fill status and disjointness hold for every job of the fixture's scope.
pub fn assert_board_consistent<S: EventStore>(fx: &Fixture<S>) {
    for job in fx.engine.jobs_for_scope(&fx.org).unwrap() {
        assert_eq!(
            job.job_status,
            job.workers.len() as u32 >= job.workers_required,
            "fill status drifted on {}",
            job.job_id
        );
        for w in &job.workers {
            assert!(!job.invited_workers.contains(w), "{w} both invited and accepted");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTiming {
    BeforeAppend,
    AfterAppend,
}

type Hook = Box<dyn FnOnce() + Send>;

/// In-memory store that runs a one-shot hook around the first append of an
/// event type, and can refuse every append of another one.
#[derive(Default)]
pub struct InterceptingStore {
    inner: InMemoryEventStore,
    hook: Mutex<Option<(String, HookTiming, Hook)>>,
    refused: Mutex<Option<String>>,
}

impl InterceptingStore {
    pub fn on_append(
        &self,
        event_type: &str,
        timing: HookTiming,
        hook: impl FnOnce() + Send + 'static,
    ) {
        *self.hook.lock().unwrap() = Some((event_type.to_string(), timing, Box::new(hook)));
    }

    /// Report a version conflict for every append of `event_type`.
    pub fn refuse(&self, event_type: &str) {
        *self.refused.lock().unwrap() = Some(event_type.to_string());
    }

    fn take_hook(&self, event_type: &str) -> Option<(HookTiming, Hook)> {
        let mut slot = self.hook.lock().unwrap();
        match slot.take() {
            Some((wanted, timing, hook)) if wanted == event_type => Some((timing, hook)),
            other => {
                *slot = other;
                None
            }
        }
    }
}

impl EventStore for InterceptingStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let event_type = events.first().map(|e| e.event_type.clone()).unwrap_or_default();

        if self.refused.lock().unwrap().as_deref() == Some(event_type.as_str()) {
            return Err(EventStoreError::Concurrency(format!("{event_type} refused")));
        }

        match self.take_hook(&event_type) {
            Some((HookTiming::BeforeAppend, hook)) => {
                hook();
                self.inner.append(events, expected_version)
            }
            Some((HookTiming::AfterAppend, hook)) => {
                let committed = self.inner.append(events, expected_version);
                hook();
                committed
            }
            None => self.inner.append(events, expected_version),
        }
    }

    fn load_stream(
        &self,
        scope: &OrganizationScope,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_stream(scope, aggregate_id)
    }

    fn owner_of(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<OrganizationScope>, EventStoreError> {
        self.inner.owner_of(aggregate_id)
    }

    fn load_scope(&self, scope: &OrganizationScope) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_scope(scope)
    }
}
