//! Background job dispatcher contract.
//!
//! Services enqueue work through [`JobDispatcher`]; the `warden-jobs`
//! crate provides the store, the worker and the handlers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WardenError, WardenResult};

/// Kinds of background work understood by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TaskKind {
    TenantInitialize,
    InvitationEmail,
    SystemUserExpiry,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::TenantInitialize,
        TaskKind::InvitationEmail,
        TaskKind::SystemUserExpiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::TenantInitialize => "tenant:initialize",
            TaskKind::InvitationEmail => "user:invitation",
            TaskKind::SystemUserExpiry => "system_user:expiry",
        }
    }

    pub fn default_queue(&self) -> TaskQueue {
        match self {
            TaskKind::TenantInitialize => TaskQueue::Critical,
            TaskKind::InvitationEmail => TaskQueue::Default,
            TaskKind::SystemUserExpiry => TaskQueue::Low,
        }
    }

    pub fn default_max_retries(&self) -> u32 {
        match self {
            TaskKind::TenantInitialize => 5,
            TaskKind::InvitationEmail => 3,
            TaskKind::SystemUserExpiry => 1,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| WardenError::Queue(format!("unknown task type: {s}")))
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl TryFrom<String> for TaskKind {
    type Error = WardenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Named priority queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskQueue {
    Critical,
    Default,
    Low,
}

impl TaskQueue {
    pub const ALL: [TaskQueue; 3] = [TaskQueue::Critical, TaskQueue::Default, TaskQueue::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskQueue::Critical => "critical",
            TaskQueue::Default => "default",
            TaskQueue::Low => "low",
        }
    }
}

impl fmt::Display for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskQueue {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "critical" => Ok(TaskQueue::Critical),
            "default" => Ok(TaskQueue::Default),
            "low" => Ok(TaskQueue::Low),
            other => Err(WardenError::Queue(format!("unknown queue: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantInitPayload {
    pub tenant_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvitationEmailPayload {
    pub invitation_id: Uuid,
}

/// A task ready to be enqueued.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    pub queue: TaskQueue,
    pub max_retries: u32,
}

impl NewTask {
    /// A task with the kind's default queue and retry budget.
    pub fn new(kind: TaskKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            queue: kind.default_queue(),
            max_retries: kind.default_max_retries(),
        }
    }

    pub fn tenant_initialization(tenant_id: Uuid) -> Self {
        Self::new(
            TaskKind::TenantInitialize,
            serde_json::json!(TenantInitPayload { tenant_id }),
        )
    }

    pub fn invitation_email(invitation_id: Uuid) -> Self {
        Self::new(
            TaskKind::InvitationEmail,
            serde_json::json!(InvitationEmailPayload { invitation_id }),
        )
    }

    pub fn system_user_expiry() -> Self {
        Self::new(TaskKind::SystemUserExpiry, serde_json::Value::Null)
    }

    pub fn on_queue(mut self, queue: TaskQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Receipt for an enqueued task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: Uuid,
    pub kind: TaskKind,
    pub queue: TaskQueue,
}

pub trait JobDispatcher: Send + Sync {
    fn enqueue(&self, task: NewTask) -> impl Future<Output = WardenResult<TaskHandle>> + Send;
}
