//! Task persistence.
//!
//! A store keeps one ready queue per [`TaskQueue`], an in-flight set of
//! reserved tasks, a schedule of delayed retries and a dead-letter list.
//! Delivery is at-least-once: a task reserved by a worker that dies
//! before acknowledging it is handed out again after [`TaskStore::recover`]
//! runs in this worker or, for shared stores, in any worker once the dead
//! one's heartbeat has lapsed.

mod memory;
mod redis_store;

pub use self::memory::InMemoryTaskStore;
pub use self::redis_store::RedisTaskStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_core::dispatch::TaskQueue;

use crate::error::JobResult;
use crate::task::{DeadLetter, Reserved, Task};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Append a task to its ready queue.
    async fn push(&self, task: &Task) -> JobResult<()>;

    /// Take the oldest ready task of `queue` and mark it in flight.
    async fn reserve(&self, queue: TaskQueue) -> JobResult<Option<Reserved>>;

    /// Forget a reserved task after it has been dealt with.
    async fn ack(&self, reserved: &Reserved) -> JobResult<()>;

    /// Keep a task aside until `run_at`.
    async fn schedule(&self, task: &Task, run_at: DateTime<Utc>) -> JobResult<()>;

    /// Move every scheduled task due at `now` back to its ready queue.
    async fn promote_due(&self, now: DateTime<Utc>) -> JobResult<usize>;

    async fn dead_letter(&self, entry: &DeadLetter) -> JobResult<()>;

    /// Return orphaned in-flight tasks to their ready queues: this
    /// consumer's own and those of consumers that stopped heartbeating.
    /// Run at start-up, before this consumer reserves anything.
    async fn recover(&self) -> JobResult<usize>;

    /// Mark this consumer alive. Shared stores expire the mark after a
    /// while; the worker refreshes it well within that window.
    async fn heartbeat(&self) -> JobResult<()> {
        Ok(())
    }

    /// Drop the liveness mark after a clean shutdown.
    async fn release(&self) -> JobResult<()> {
        Ok(())
    }

    async fn queue_len(&self, queue: TaskQueue) -> JobResult<usize>;

    async fn scheduled_len(&self) -> JobResult<usize>;

    async fn dead_letters(&self, limit: usize) -> JobResult<Vec<DeadLetter>>;
}
