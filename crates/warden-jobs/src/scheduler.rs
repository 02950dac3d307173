//! Periodic task scheduling.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_core::dispatch::{JobDispatcher, NewTask, TaskHandle};
use warden_core::error::WardenResult;

/// Enqueues the expiry sweep on a fixed interval. The first sweep is
/// enqueued immediately.
pub struct Scheduler<D: JobDispatcher> {
    dispatcher: D,
    interval: Duration,
}

impl<D: JobDispatcher> Scheduler<D> {
    pub fn new(dispatcher: D, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn tick(&self) -> WardenResult<TaskHandle> {
        let handle = self.dispatcher.enqueue(NewTask::system_user_expiry()).await?;
        debug!(task_id = %handle.id, "Expiry sweep scheduled");
        Ok(handle)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Failed to schedule expiry sweep");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }
}
