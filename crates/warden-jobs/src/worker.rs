//! Task worker.
//!
//! The worker pulls tasks from a [`TaskStore`] in weighted queue order,
//! runs each through the handler registered for its kind and settles
//! the outcome: acknowledged on success, scheduled for a delayed retry
//! on failure, dead-lettered once the retry budget is spent.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_core::dispatch::{TaskKind, TaskQueue};

use crate::config::WorkerConfig;
use crate::error::{JobError, JobResult};
use crate::handlers::TaskHandler;
use crate::store::TaskStore;
use crate::task::{DeadLetter, Reserved, RetryPolicy};

/// Relative polling weights per queue, parsed from `name:weight` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueWeights(Vec<(TaskQueue, u32)>);

impl QueueWeights {
    pub fn total(&self) -> u32 {
        self.0.iter().map(|(_, w)| *w).sum()
    }

    pub fn queues(&self) -> impl Iterator<Item = TaskQueue> + '_ {
        self.0.iter().map(|(q, _)| *q)
    }

    /// Polling order for one reservation attempt, chosen at random in
    /// proportion to the weights.
    pub fn order(&self) -> Vec<TaskQueue> {
        let roll = rand::rng().random_range(0..self.total());
        self.order_with(roll)
    }

    /// Polling order for a given roll in `0..total()`: the queue whose
    /// weight band contains `roll` first, the rest by descending weight.
    pub fn order_with(&self, roll: u32) -> Vec<TaskQueue> {
        let roll = roll % self.total();
        let mut cumulative = 0;
        let mut first = self.0[0].0;
        for (queue, weight) in &self.0 {
            cumulative += weight;
            if roll < cumulative {
                first = *queue;
                break;
            }
        }

        let mut rest: Vec<(TaskQueue, u32)> =
            self.0.iter().copied().filter(|(q, _)| *q != first).collect();
        rest.sort_by(|a, b| b.1.cmp(&a.1));

        std::iter::once(first)
            .chain(rest.into_iter().map(|(q, _)| q))
            .collect()
    }
}

impl Default for QueueWeights {
    fn default() -> Self {
        Self(vec![
            (TaskQueue::Critical, 6),
            (TaskQueue::Default, 3),
            (TaskQueue::Low, 1),
        ])
    }
}

impl FromStr for QueueWeights {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut weights: Vec<(TaskQueue, u32)> = Vec::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, weight) = match entry.split_once(':') {
                Some((name, weight)) => {
                    let weight = weight.trim().parse::<u32>().map_err(|_| {
                        JobError::Config(format!("invalid weight in queue entry '{entry}'"))
                    })?;
                    (name, weight)
                }
                None => (entry, 1),
            };
            let queue: TaskQueue = name
                .parse()
                .map_err(|_| JobError::Config(format!("unknown queue '{}'", name.trim())))?;
            if weight == 0 {
                return Err(JobError::Config(format!("queue '{queue}' has zero weight")));
            }
            if weights.iter().any(|(q, _)| *q == queue) {
                return Err(JobError::Config(format!("queue '{queue}' listed twice")));
            }
            weights.push((queue, weight));
        }

        if weights.is_empty() {
            return Err(JobError::Config("no queues configured".into()));
        }
        Ok(Self(weights))
    }
}

impl fmt::Display for QueueWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(q, w)| format!("{q}:{w}")).collect();
        f.write_str(&parts.join(","))
    }
}

/// What happened to a processed task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { id: Uuid },
    /// Failed; retry number `retry` is scheduled.
    Retrying { id: Uuid, retry: u32, delay: Duration },
    DeadLettered { id: Uuid, reason: String },
}

impl Outcome {
    pub fn id(&self) -> Uuid {
        match self {
            Outcome::Completed { id }
            | Outcome::Retrying { id, .. }
            | Outcome::DeadLettered { id, .. } => *id,
        }
    }
}

pub struct Worker {
    store: Arc<dyn TaskStore>,
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    weights: QueueWeights,
    retry: RetryPolicy,
    concurrency: usize,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl Worker {
    pub fn new(store: Arc<dyn TaskStore>, config: &WorkerConfig) -> JobResult<Self> {
        Ok(Self {
            store,
            handlers: HashMap::new(),
            weights: config.queues.parse()?,
            retry: RetryPolicy::from_config(config),
            concurrency: config.concurrency.max(1),
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Register `handler` for its kind, replacing any previous one.
    pub fn register<H: TaskHandler + 'static>(&mut self, handler: H) -> &mut Self {
        let kind = handler.kind();
        if self.handlers.insert(kind, Arc::new(handler)).is_some() {
            warn!(kind = %kind, "Replaced task handler");
        }
        self
    }

    pub fn handles(&self, kind: TaskKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    async fn reserve_next(&self) -> JobResult<Option<Reserved>> {
        for queue in self.weights.order() {
            if let Some(reserved) = self.store.reserve(queue).await? {
                return Ok(Some(reserved));
            }
        }
        Ok(None)
    }

    /// Promote due retries, then process at most one task.
    pub async fn run_once(&self) -> JobResult<Option<Outcome>> {
        self.store.promote_due(Utc::now()).await?;
        match self.reserve_next().await? {
            Some(reserved) => self.process(reserved).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run one reserved task and settle it in the store. A settlement
    /// error leaves the task in flight for [`TaskStore::recover`].
    async fn process(&self, reserved: Reserved) -> JobResult<Outcome> {
        let task = &reserved.task;
        let started = Instant::now();

        let result = match self.handlers.get(&task.kind) {
            Some(handler) => handler.handle(task).await,
            None => Err(JobError::UnknownTask(task.kind.to_string())),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(()) => {
                info!(task_id = %task.id, kind = %task.kind, elapsed_ms, "Task completed");
                Outcome::Completed { id: task.id }
            }
            Err(err @ JobError::UnknownTask(_)) => {
                let reason = err.to_string();
                error!(task_id = %task.id, kind = %task.kind, "No handler registered, dead-lettering");
                self.store
                    .dead_letter(&DeadLetter::new(task.clone(), reason.clone()))
                    .await?;
                Outcome::DeadLettered { id: task.id, reason }
            }
            Err(err) if task.can_retry() => {
                let mut next = task.clone();
                next.retries += 1;
                next.last_error = Some(err.to_string());
                let delay = self.retry.delay_for(next.retries);
                let run_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                self.store.schedule(&next, run_at).await?;
                warn!(
                    task_id = %task.id,
                    kind = %task.kind,
                    retry = next.retries,
                    max_retries = task.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Task failed, retry scheduled"
                );
                Outcome::Retrying {
                    id: task.id,
                    retry: next.retries,
                    delay,
                }
            }
            Err(err) => {
                let reason = err.to_string();
                let mut dead = task.clone();
                dead.last_error = Some(reason.clone());
                self.store
                    .dead_letter(&DeadLetter::new(dead, reason.clone()))
                    .await?;
                error!(
                    task_id = %task.id,
                    kind = %task.kind,
                    retries = task.retries,
                    error = %err,
                    "Task exhausted its retries, dead-lettered"
                );
                Outcome::DeadLettered { id: task.id, reason }
            }
        };

        self.store.ack(&reserved).await?;
        Ok(outcome)
    }

    /// Process tasks until `shutdown` flips to `true` or its sender is
    /// dropped. In-flight tasks are drained before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> JobResult<()> {
        let recovered = self.store.recover().await?;
        if recovered > 0 {
            warn!(recovered, "Re-queued tasks left in flight by a previous run");
        }

        for kind in TaskKind::ALL {
            if !self.handles(kind) {
                warn!(kind = %kind, "No handler registered; tasks of this kind will be dead-lettered");
            }
        }
        info!(
            concurrency = self.concurrency,
            queues = %self.weights,
            "Worker started"
        );

        let poll_interval = self.poll_interval;
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let beat = tokio::spawn(keep_alive(self.store.clone(), self.heartbeat_interval));
        let worker = Arc::new(self);
        let mut running = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }
            while let Some(joined) = running.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Task processing panicked");
                }
            }

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            if let Err(e) = worker.store.promote_due(Utc::now()).await {
                error!(error = %e, "Failed to promote scheduled tasks");
            }

            match worker.reserve_next().await {
                Ok(Some(reserved)) => {
                    let worker = worker.clone();
                    running.spawn(async move {
                        let _permit = permit;
                        let id = reserved.task.id;
                        if let Err(e) = worker.process(reserved).await {
                            error!(task_id = %id, error = %e, "Failed to settle task");
                        }
                    });
                    continue;
                }
                Ok(None) => debug!("All queues empty"),
                Err(e) => error!(error = %e, "Failed to reserve task"),
            }
            drop(permit);

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = running.len(), "Worker stopping, draining in-flight tasks");
        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Task processing panicked");
            }
        }
        beat.abort();
        if let Err(e) = worker.store.release().await {
            warn!(error = %e, "Failed to release worker heartbeat");
        }
        info!("Worker stopped");
        Ok(())
    }
}

/// Refresh the store heartbeat until aborted.
async fn keep_alive(store: Arc<dyn TaskStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = store.heartbeat().await {
            warn!(error = %e, "Failed to refresh worker heartbeat");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_weighted_queue_list() {
        let weights: QueueWeights = " critical:6, default:3 ,low:1".parse().unwrap();
        assert_eq!(weights, QueueWeights::default());
        assert_eq!(weights.total(), 10);
        assert_eq!(weights.to_string(), "critical:6,default:3,low:1");

        let single: QueueWeights = "default".parse().unwrap();
        assert_eq!(single.total(), 1);
    }

    #[test]
    fn rejects_bad_queue_lists() {
        for raw in ["", "urgent:2", "critical:x", "critical:0", "low:1,low:2"] {
            assert!(
                matches!(raw.parse::<QueueWeights>(), Err(JobError::Config(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn roll_picks_queue_by_weight_band() {
        let weights = QueueWeights::default();
        use TaskQueue::*;

        assert_eq!(weights.order_with(0), vec![Critical, Default, Low]);
        assert_eq!(weights.order_with(5), vec![Critical, Default, Low]);
        assert_eq!(weights.order_with(6), vec![Default, Critical, Low]);
        assert_eq!(weights.order_with(8), vec![Default, Critical, Low]);
        assert_eq!(weights.order_with(9), vec![Low, Critical, Default]);
    }

    #[test]
    fn every_queue_is_polled_each_round() {
        let weights: QueueWeights = "low:1,critical:2".parse().unwrap();
        for _ in 0..20 {
            let order = weights.order();
            assert_eq!(order.len(), 2);
            assert!(order.contains(&TaskQueue::Low));
            assert!(order.contains(&TaskQueue::Critical));
        }
    }
}
