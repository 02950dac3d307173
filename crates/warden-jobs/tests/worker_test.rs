//! Worker behaviour against the in-memory task store with scripted
//! handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;
use warden_core::dispatch::{JobDispatcher, NewTask, TaskKind, TaskQueue};
use warden_jobs::config::WorkerConfig;
use warden_jobs::{
    InMemoryTaskStore, JobError, JobResult, Outcome, QueueDispatcher, RetryPolicy, Scheduler,
    Task, TaskHandler, TaskStore, Worker,
};

/// Fails its first `failures` calls, then succeeds.
struct ScriptedHandler {
    kind: TaskKind,
    failures: u32,
    calls: Arc<AtomicU32>,
}

impl ScriptedHandler {
    fn new(kind: TaskKind, failures: u32) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                kind,
                failures,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl TaskHandler for ScriptedHandler {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn handle(&self, _task: &Task) -> JobResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(JobError::Handler(format!("attempt {} failed", call + 1)));
        }
        Ok(())
    }
}

fn immediate_retries() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: 0.0,
    }
}

fn setup() -> (Arc<InMemoryTaskStore>, Worker, QueueDispatcher) {
    let store = Arc::new(InMemoryTaskStore::new());
    let worker = Worker::new(store.clone(), &WorkerConfig::default())
        .unwrap()
        .with_retry_policy(immediate_retries());
    let dispatcher = QueueDispatcher::new(store.clone());
    (store, worker, dispatcher)
}

#[tokio::test]
async fn successful_task_is_acknowledged() {
    let (store, mut worker, dispatcher) = setup();
    let (handler, calls) = ScriptedHandler::new(TaskKind::SystemUserExpiry, 0);
    worker.register(handler);

    let handle = dispatcher
        .enqueue(NewTask::system_user_expiry())
        .await
        .unwrap();
    assert_eq!(handle.queue, TaskQueue::Low);

    let outcome = worker.run_once().await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Completed { id: handle.id });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.in_flight_len().await, 0);
    assert_eq!(store.queue_len(TaskQueue::Low).await.unwrap(), 0);

    assert!(worker.run_once().await.unwrap().is_none());
}

#[tokio::test]
async fn failing_task_is_retried_then_succeeds() {
    let (store, mut worker, dispatcher) = setup();
    let (handler, calls) = ScriptedHandler::new(TaskKind::InvitationEmail, 2);
    worker.register(handler);

    let handle = dispatcher
        .enqueue(NewTask::invitation_email(Uuid::new_v4()))
        .await
        .unwrap();

    for retry in 1..=2 {
        let outcome = worker.run_once().await.unwrap().unwrap();
        assert!(
            matches!(outcome, Outcome::Retrying { id, retry: r, .. } if id == handle.id && r == retry),
            "unexpected outcome {outcome:?}"
        );
    }
    assert_eq!(
        worker.run_once().await.unwrap().unwrap(),
        Outcome::Completed { id: handle.id }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(store.dead_letters(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn exhausted_task_is_dead_lettered() {
    let (store, mut worker, dispatcher) = setup();
    let (handler, calls) = ScriptedHandler::new(TaskKind::TenantInitialize, u32::MAX);
    worker.register(handler);

    let handle = dispatcher
        .enqueue(NewTask::tenant_initialization(Uuid::new_v4()).with_max_retries(2))
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    while let Some(outcome) = worker.run_once().await.unwrap() {
        outcomes.push(outcome);
    }

    // One first attempt plus two retries.
    assert_eq!(outcomes.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(outcomes[2], Outcome::DeadLettered { id, .. } if id == handle.id));

    let dead = store.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].task.id, handle.id);
    assert_eq!(dead[0].task.retries, 2);
    assert_eq!(
        dead[0].task.last_error.as_deref(),
        Some("handler failed: attempt 3 failed")
    );
    assert_eq!(store.scheduled_len().await.unwrap(), 0);
    assert_eq!(store.in_flight_len().await, 0);
}

#[tokio::test]
async fn delayed_retry_waits_for_its_slot() {
    let store = Arc::new(InMemoryTaskStore::new());
    let mut worker = Worker::new(store.clone(), &WorkerConfig::default())
        .unwrap()
        .with_retry_policy(RetryPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        });
    let (handler, _) = ScriptedHandler::new(TaskKind::InvitationEmail, 1);
    worker.register(handler);

    store
        .push(&Task::new(NewTask::invitation_email(Uuid::new_v4())))
        .await
        .unwrap();

    let outcome = worker.run_once().await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        Outcome::Retrying { retry: 1, delay, .. } if delay == Duration::from_secs(60)
    ));
    assert!(worker.run_once().await.unwrap().is_none());
    assert_eq!(store.scheduled_len().await.unwrap(), 1);
}

#[tokio::test]
async fn task_without_handler_is_dead_lettered_immediately() {
    let (store, worker, dispatcher) = setup();
    let handle = dispatcher
        .enqueue(NewTask::invitation_email(Uuid::new_v4()))
        .await
        .unwrap();

    let outcome = worker.run_once().await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::DeadLettered { id, .. } if id == handle.id));

    let dead = store.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.contains("user:invitation"));
    assert_eq!(store.scheduled_len().await.unwrap(), 0);
}

#[tokio::test]
async fn unconfigured_queues_are_not_polled() {
    let store = Arc::new(InMemoryTaskStore::new());
    let config = WorkerConfig {
        queues: "critical:1".into(),
        ..Default::default()
    };
    let mut worker = Worker::new(store.clone(), &config).unwrap();
    let (handler, calls) = ScriptedHandler::new(TaskKind::SystemUserExpiry, 0);
    worker.register(handler);

    store
        .push(&Task::new(NewTask::system_user_expiry()))
        .await
        .unwrap();
    assert!(worker.run_once().await.unwrap().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store
        .push(&Task::new(
            NewTask::system_user_expiry().on_queue(TaskQueue::Critical),
        ))
        .await
        .unwrap();
    assert!(worker.run_once().await.unwrap().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bad_queue_configuration_is_rejected() {
    let store = Arc::new(InMemoryTaskStore::new());
    let config = WorkerConfig {
        queues: "critical:0".into(),
        ..Default::default()
    };
    assert!(matches!(
        Worker::new(store, &config),
        Err(JobError::Config(_))
    ));
}

#[tokio::test]
async fn run_recovers_processes_and_stops_on_shutdown() {
    let store = Arc::new(InMemoryTaskStore::new());
    let config = WorkerConfig {
        concurrency: 2,
        poll_interval_ms: 10,
        ..Default::default()
    };
    let mut worker = Worker::new(store.clone(), &config)
        .unwrap()
        .with_retry_policy(immediate_retries());
    let (handler, calls) = ScriptedHandler::new(TaskKind::InvitationEmail, 0);
    worker.register(handler);

    // Left in flight by a crashed worker.
    store
        .push(&Task::new(NewTask::invitation_email(Uuid::new_v4())))
        .await
        .unwrap();
    store.reserve(TaskQueue::Default).await.unwrap().unwrap();
    for _ in 0..4 {
        store
            .push(&Task::new(NewTask::invitation_email(Uuid::new_v4())))
            .await
            .unwrap();
    }

    let (tx, rx) = watch::channel(false);
    let running = tokio::spawn(worker.run(rx));

    tokio::time::timeout(Duration::from_secs(5), async {
        while calls.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("worker did not drain the queue");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(store.in_flight_len().await, 0);
    assert_eq!(store.queue_len(TaskQueue::Default).await.unwrap(), 0);
}

#[tokio::test]
async fn scheduler_enqueues_expiry_sweeps() {
    let store = Arc::new(InMemoryTaskStore::new());
    let scheduler = Scheduler::new(QueueDispatcher::new(store.clone()), Duration::from_secs(3600));

    let handle = scheduler.tick().await.unwrap();
    assert_eq!(handle.kind, TaskKind::SystemUserExpiry);
    assert_eq!(handle.queue, TaskQueue::Low);
    assert_eq!(store.queue_len(TaskQueue::Low).await.unwrap(), 1);

    // The first interval tick fires at once.
    let (tx, rx) = watch::channel(false);
    let running = tokio::spawn(scheduler.run(rx));
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.queue_len(TaskQueue::Low).await.unwrap() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scheduler did not tick");

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}
