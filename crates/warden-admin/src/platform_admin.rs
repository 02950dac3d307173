//! Platform admin registry.
//!
//! Platform admins operate across every tenant without holding a
//! membership in it. The registry is a flat list of identity-provider
//! user ids.

use tracing::info;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::platform_admin::{CreatePlatformAdmin, PlatformAdmin};
use warden_core::repository::PlatformAdminRepository;

use crate::error::AdminError;

pub struct PlatformAdminService<P: PlatformAdminRepository> {
    admins: P,
}

impl<P: PlatformAdminRepository> PlatformAdminService<P> {
    pub fn new(admins: P) -> Self {
        Self { admins }
    }

    /// Grant platform admin status to `user_id`. `Conflict` if the user
    /// already holds it.
    pub async fn create_admin(&self, user_id: &str, created_by: &str) -> WardenResult<PlatformAdmin> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(WardenError::validation("user id must not be empty"));
        }
        if self.admins.exists(user_id).await? {
            return Err(AdminError::AlreadyPlatformAdmin.into());
        }

        let admin = self
            .admins
            .create(CreatePlatformAdmin {
                user_id: user_id.to_owned(),
                created_by: created_by.to_owned(),
            })
            .await
            .map_err(|e| match e {
                WardenError::AlreadyExists { .. } => AdminError::AlreadyPlatformAdmin.into(),
                other => other,
            })?;

        info!(user_id, created_by, "Platform admin created");
        Ok(admin)
    }

    pub async fn get_admin(&self, user_id: &str) -> WardenResult<PlatformAdmin> {
        self.admins.get_by_user(user_id).await
    }

    /// Newest first.
    pub async fn list_admins(&self) -> WardenResult<Vec<PlatformAdmin>> {
        self.admins.list().await
    }

    pub async fn delete_admin(&self, user_id: &str) -> WardenResult<()> {
        self.admins.delete(user_id).await?;
        info!(user_id, "Platform admin removed");
        Ok(())
    }

    /// Storage faults are errors, never a plain `false`.
    pub async fn is_platform_admin(&self, user_id: &str) -> WardenResult<bool> {
        self.admins.exists(user_id).await
    }
}
