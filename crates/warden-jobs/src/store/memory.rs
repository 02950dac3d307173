//! In-process task store for tests and single-process setups.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;
use warden_core::dispatch::TaskQueue;

use super::TaskStore;
use crate::error::JobResult;
use crate::task::{DeadLetter, Reserved, Task};

#[derive(Debug, Default)]
struct State {
    ready: HashMap<TaskQueue, VecDeque<Task>>,
    in_flight: HashMap<Uuid, Task>,
    scheduled: Vec<(DateTime<Utc>, Task)>,
    dead: Vec<DeadLetter>,
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: Mutex<State>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ready task of `queue`, oldest first.
    pub async fn ready(&self, queue: TaskQueue) -> Vec<Task> {
        self.state
            .lock()
            .await
            .ready
            .get(&queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn push(&self, task: &Task) -> JobResult<()> {
        self.state
            .lock()
            .await
            .ready
            .entry(task.queue)
            .or_default()
            .push_back(task.clone());
        Ok(())
    }

    async fn reserve(&self, queue: TaskQueue) -> JobResult<Option<Reserved>> {
        let mut state = self.state.lock().await;
        let Some(task) = state.ready.get_mut(&queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        state.in_flight.insert(task.id, task.clone());
        Ok(Some(Reserved {
            receipt: task.id.to_string(),
            task,
        }))
    }

    async fn ack(&self, reserved: &Reserved) -> JobResult<()> {
        self.state.lock().await.in_flight.remove(&reserved.task.id);
        Ok(())
    }

    async fn schedule(&self, task: &Task, run_at: DateTime<Utc>) -> JobResult<()> {
        self.state
            .lock()
            .await
            .scheduled
            .push((run_at, task.clone()));
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> JobResult<usize> {
        let mut state = self.state.lock().await;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.scheduled)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        state.scheduled = waiting;

        let promoted = due.len();
        for (_, task) in due {
            state.ready.entry(task.queue).or_default().push_back(task);
        }
        Ok(promoted)
    }

    async fn dead_letter(&self, entry: &DeadLetter) -> JobResult<()> {
        self.state.lock().await.dead.push(entry.clone());
        Ok(())
    }

    async fn recover(&self) -> JobResult<usize> {
        let mut state = self.state.lock().await;
        let orphans: Vec<Task> = state.in_flight.drain().map(|(_, task)| task).collect();
        let recovered = orphans.len();
        for task in orphans {
            state.ready.entry(task.queue).or_default().push_front(task);
        }
        Ok(recovered)
    }

    async fn queue_len(&self, queue: TaskQueue) -> JobResult<usize> {
        Ok(self
            .state
            .lock()
            .await
            .ready
            .get(&queue)
            .map_or(0, VecDeque::len))
    }

    async fn scheduled_len(&self) -> JobResult<usize> {
        Ok(self.state.lock().await.scheduled.len())
    }

    async fn dead_letters(&self, limit: usize) -> JobResult<Vec<DeadLetter>> {
        let state = self.state.lock().await;
        Ok(state.dead.iter().rev().take(limit).cloned().collect())
    }
}
