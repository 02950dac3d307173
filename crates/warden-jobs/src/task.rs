//! Task envelope and retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::dispatch::{NewTask, TaskHandle, TaskKind, TaskQueue};

use crate::config::WorkerConfig;

/// A task as it travels through the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub queue: TaskQueue,
    pub payload: serde_json::Value,
    /// Retries already consumed.
    pub retries: u32,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(task: NewTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: task.kind,
            queue: task.queue,
            payload: task.payload,
            retries: 0,
            max_retries: task.max_retries,
            enqueued_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.id,
            kind: self.kind,
            queue: self.queue,
        }
    }

    /// Decode the payload into the kind's payload type.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn can_retry(&self) -> bool {
        self.retries < self.max_retries
    }
}

/// A task that has been removed from a ready queue and awaits
/// acknowledgement.
#[derive(Debug, Clone)]
pub struct Reserved {
    pub task: Task,
    /// Store-specific token identifying the in-flight entry.
    pub receipt: String,
}

/// A task that exhausted its retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetter {
    pub task: Task,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(task: Task, reason: impl Into<String>) -> Self {
        Self {
            task,
            reason: reason.into(),
            dead_lettered_at: Utc::now(),
        }
    }
}

/// Exponential backoff with jitter, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomly added or removed (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(600),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_secs(config.retry_max_delay_secs),
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Delay before retry number `retry`, with jitter applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let spread = self.jitter.min(1.0);
        let factor = rand::rng().random_range(1.0 - spread..=1.0 + spread);
        base.mul_f64(factor).min(self.max_delay)
    }
}
