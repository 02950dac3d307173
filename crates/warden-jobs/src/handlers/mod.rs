//! Task handlers.

mod expiry;
mod invitation_email;
mod tenant_init;

pub use expiry::ExpirySweepHandler;
pub use invitation_email::{InvitationEmailHandler, render_invitation};
pub use tenant_init::{TenantInitHandler, TenantInitRequest};

use async_trait::async_trait;
use warden_core::dispatch::TaskKind;

use crate::error::JobResult;
use crate::task::Task;

/// Executes tasks of one kind. An `Err` schedules a retry while the
/// task has retries left.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn handle(&self, task: &Task) -> JobResult<()>;
}
