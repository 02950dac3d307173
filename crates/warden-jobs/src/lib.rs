//! Warden Jobs — background task processing.
//!
//! Services enqueue work through [`QueueDispatcher`]; a [`Worker`]
//! consumes it from a [`TaskStore`] and runs the registered
//! [`TaskHandler`]s. The [`Scheduler`] enqueues recurring sweeps.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod worker;

pub use config::{EmailConfig, TenantInitConfig, WorkerConfig};
pub use dispatcher::QueueDispatcher;
pub use error::{JobError, JobResult};
pub use handlers::{ExpirySweepHandler, InvitationEmailHandler, TaskHandler, TenantInitHandler};
pub use mailer::{EmailMessage, LogMailer, Mailer, RecordingMailer};
pub use scheduler::Scheduler;
pub use store::{InMemoryTaskStore, RedisTaskStore, TaskStore};
pub use task::{DeadLetter, Reserved, RetryPolicy, Task};
pub use worker::{Outcome, QueueWeights, Worker};
