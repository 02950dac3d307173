//! [`JobDispatcher`] backed by a [`TaskStore`].

use std::sync::Arc;

use tracing::info;
use warden_core::dispatch::{JobDispatcher, NewTask, TaskHandle};
use warden_core::error::WardenResult;

use crate::store::TaskStore;
use crate::task::Task;

/// Cloning yields another handle onto the same store.
#[derive(Clone)]
pub struct QueueDispatcher {
    store: Arc<dyn TaskStore>,
}

impl QueueDispatcher {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl JobDispatcher for QueueDispatcher {
    async fn enqueue(&self, task: NewTask) -> WardenResult<TaskHandle> {
        let task = Task::new(task);
        self.store.push(&task).await?;

        info!(
            task_id = %task.id,
            kind = %task.kind,
            queue = %task.queue,
            max_retries = task.max_retries,
            "Task enqueued"
        );
        Ok(task.handle())
    }
}
