//! Periodic expiry sweep for system users and invitations.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use warden_admin::system_user::SystemUserService;
use warden_core::dispatch::TaskKind;
use warden_core::identity::IdentityProvider;
use warden_core::repository::{InvitationRepository, SystemUserRepository};

use super::TaskHandler;
use crate::error::JobResult;
use crate::task::Task;

pub struct ExpirySweepHandler<R: SystemUserRepository, I: IdentityProvider, V: InvitationRepository> {
    system_users: Arc<SystemUserService<R, I>>,
    invitations: V,
}

impl<R, I, V> ExpirySweepHandler<R, I, V>
where
    R: SystemUserRepository,
    I: IdentityProvider,
    V: InvitationRepository,
{
    pub fn new(system_users: Arc<SystemUserService<R, I>>, invitations: V) -> Self {
        Self {
            system_users,
            invitations,
        }
    }
}

#[async_trait]
impl<R, I, V> TaskHandler for ExpirySweepHandler<R, I, V>
where
    R: SystemUserRepository + 'static,
    I: IdentityProvider + 'static,
    V: InvitationRepository + 'static,
{
    fn kind(&self) -> TaskKind {
        TaskKind::SystemUserExpiry
    }

    async fn handle(&self, _task: &Task) -> JobResult<()> {
        let system_users = self.system_users.deactivate_expired().await?;
        let invitations = self.invitations.expire_stale().await?;
        info!(system_users, invitations, "Expiry sweep finished");
        Ok(())
    }
}
