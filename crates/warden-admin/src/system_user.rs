//! System-user (machine credential) lifecycle.
//!
//! A credential moves through three states:
//!
//! * active primary: serves traffic and never expires;
//! * active non-primary with `expires_at`: the grace period after a
//!   rotation, during which old and new credentials both authenticate;
//! * inactive: terminal, reached through the expiry sweep or an
//!   explicit revoke/deactivate.
//!
//! Secrets live in the identity provider; Warden stores only the
//! lifecycle. The two stores are kept in step by ordering the calls and
//! compensating on failure, not by a distributed transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::identity::IdentityProvider;
use warden_core::models::system_user::{
    CreateSystemUser, ServiceType, SystemUser, UpdateSystemUser,
};
use warden_core::repository::SystemUserRepository;

use crate::config::SystemUserConfig;
use crate::error::AdminError;
use crate::secret::{self, OneTimeSecret};

const CREATE_MESSAGE: &str = "Save this password securely. It will not be shown again.";

/// Input for [`SystemUserService::create`].
#[derive(Debug, Clone)]
pub struct NewSystemUser {
    pub name: String,
    pub description: String,
    pub service_type: ServiceType,
    pub created_by: String,
}

/// A credential that remains valid for a while after a rotation.
#[derive(Debug, Clone)]
pub struct OldCredential {
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// Result of issuing a credential.
///
/// `password` is the only copy of the secret that will ever exist
/// outside the identity provider.
#[derive(Debug)]
pub struct IssuedCredential {
    pub system_user: SystemUser,
    pub password: OneTimeSecret,
    pub message: String,
    pub old_credentials: Vec<OldCredential>,
}

/// Undo actions for a rotation that failed after its first write.
enum Compensation {
    /// The old credential was demoted; nothing exists on the provider yet.
    RestorePrimary { old_id: Uuid },
    /// The new identity exists on the provider but has no local row.
    RestorePrimaryAndDeleteIdentity { old_id: Uuid, identity_id: String },
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Lowercase ASCII alphanumerics, `-` and `_`.
fn validate_name(name: &str) -> Result<(), AdminError> {
    if name.is_empty() {
        return Err(AdminError::InvalidName("name must not be empty".into()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(AdminError::InvalidName(format!(
            "{name:?} may only contain lowercase letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

/// Issues, rotates and revokes machine credentials.
pub struct SystemUserService<R: SystemUserRepository, I: IdentityProvider> {
    repo: R,
    identity: I,
    config: SystemUserConfig,
    identity_tenant: String,
    rotation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: SystemUserRepository, I: IdentityProvider> SystemUserService<R, I> {
    pub fn new(
        repo: R,
        identity: I,
        config: SystemUserConfig,
        identity_tenant: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            identity,
            config,
            identity_tenant: identity_tenant.into(),
            rotation_locks: Mutex::new(HashMap::new()),
        }
    }

    fn email_for(&self, name: &str) -> String {
        format!("{name}@{}", self.config.email_domain)
    }

    /// Serialises rotations of one application inside this process.
    async fn lock_application(&self, application_name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.rotation_locks.lock().await;
            locks
                .entry(application_name.to_owned())
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    async fn name_taken(&self, name: &str) -> WardenResult<bool> {
        match self.repo.get_by_name(name).await {
            Ok(_) => Ok(true),
            Err(WardenError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Best-effort removal of an identity that has no local row.
    async fn discard_identity(&self, identity_id: &str) {
        if let Err(e) = self.identity.delete_identity(identity_id).await {
            error!(
                identity_id,
                error = %e,
                "Could not delete orphaned identity; manual cleanup required"
            );
        }
    }

    /// Best-effort session revocation.
    async fn revoke_sessions(&self, user: &SystemUser) {
        if let Err(e) = self.identity.revoke_all_sessions(&user.identity_id).await {
            warn!(
                system_user_id = %user.id,
                identity_id = %user.identity_id,
                error = %e,
                "Failed to revoke sessions"
            );
        }
    }

    /// Issue a brand-new primary credential for application `name`.
    ///
    /// If the local row cannot be written the freshly created identity
    /// is deleted again so no orphan is left behind.
    pub async fn create(&self, input: NewSystemUser) -> WardenResult<IssuedCredential> {
        validate_name(&input.name)?;
        if self.name_taken(&input.name).await? {
            return Err(WardenError::already_exists("system_user"));
        }

        let email = self.email_for(&input.name);
        let password = secret::generate_password(&self.config);

        let identity_id = self
            .identity
            .sign_up(&self.identity_tenant, &email, password.expose())
            .await?;

        let metadata = json!({
            "is_system_user": true,
            "service_name": input.name,
            "service_type": input.service_type.as_str(),
            "created_by": input.created_by,
        });

        if let Err(e) = self.identity.set_metadata(&identity_id, metadata.clone()).await {
            self.discard_identity(&identity_id).await;
            return Err(e.into());
        }

        let created = self
            .repo
            .create(CreateSystemUser {
                name: input.name.clone(),
                application_name: input.name,
                email,
                identity_id: identity_id.clone(),
                description: input.description,
                service_type: input.service_type,
                created_by: input.created_by,
                metadata: Some(metadata),
            })
            .await;

        let system_user = match created {
            Ok(user) => user,
            Err(e) => {
                self.discard_identity(&identity_id).await;
                return Err(e);
            }
        };

        info!(
            system_user_id = %system_user.id,
            name = %system_user.name,
            service_type = system_user.service_type.as_str(),
            "System user created"
        );

        Ok(IssuedCredential {
            system_user,
            password,
            message: CREATE_MESSAGE.into(),
            old_credentials: Vec::new(),
        })
    }

    /// Rotate the primary credential of an application with zero downtime.
    ///
    /// The current credential is demoted and keeps working until
    /// `now + grace_period_days`; a new versioned credential becomes the
    /// primary. `grace_period_days <= 0` uses the configured default.
    ///
    /// On failure every completed step is undone: the old credential is
    /// restored as primary and any identity created on the provider is
    /// deleted.
    pub async fn rotate_with_grace_period(
        &self,
        id: Uuid,
        grace_period_days: i64,
    ) -> WardenResult<IssuedCredential> {
        let grace_period_days = if grace_period_days > 0 {
            grace_period_days
        } else {
            self.config.default_grace_period_days
        };
        // Checked before anything is written; the clock is re-read below.
        grace_expiry(Utc::now(), grace_period_days)?;

        let target = self.repo.get_by_id(id).await?;
        let _guard = self.lock_application(&target.application_name).await;

        // Re-read under the lock; a concurrent rotation may have demoted it.
        let current = self.repo.get_by_id(id).await?;
        if !current.is_active {
            return Err(AdminError::CredentialInactive.into());
        }
        if !current.is_primary {
            return Err(AdminError::NotPrimary.into());
        }

        let expires_at = grace_expiry(Utc::now(), grace_period_days)?;
        let demoted = self.repo.demote(current.id, expires_at).await?;

        match self.issue_next_version(&current, grace_period_days).await {
            Ok((system_user, password, version)) => {
                info!(
                    application = %current.application_name,
                    old_id = %current.id,
                    new_id = %system_user.id,
                    version,
                    expires_at = %timestamp(expires_at),
                    "System user rotated"
                );

                let old = OldCredential {
                    email: demoted.email,
                    expires_at,
                    message: format!(
                        "This credential will stop working on {}",
                        timestamp(expires_at)
                    ),
                };

                Ok(IssuedCredential {
                    system_user,
                    password,
                    message: format!(
                        "New credential created. Old credentials will expire on {}. \
                         Both work during grace period ({} days).",
                        timestamp(expires_at),
                        grace_period_days
                    ),
                    old_credentials: vec![old],
                })
            }
            Err((e, compensation)) => {
                self.compensate(compensation).await;
                Err(e)
            }
        }
    }

    /// Steps after the demotion. Each failure carries the compensation
    /// that undoes everything done so far.
    async fn issue_next_version(
        &self,
        current: &SystemUser,
        grace_period_days: i64,
    ) -> Result<(SystemUser, OneTimeSecret, u64), (WardenError, Compensation)> {
        let restore = || Compensation::RestorePrimary { old_id: current.id };
        let app = &current.application_name;

        let mut version = self
            .repo
            .count_by_application(app)
            .await
            .map_err(|e| (e, restore()))?
            + 1;
        let mut name = format!("{app}-v{version}");
        while self.name_taken(&name).await.map_err(|e| (e, restore()))? {
            version += 1;
            name = format!("{app}-v{version}");
        }

        let email = self.email_for(&name);
        let password = secret::generate_password(&self.config);

        let identity_id = self
            .identity
            .sign_up(&self.identity_tenant, &email, password.expose())
            .await
            .map_err(|e| (WardenError::from(e), restore()))?;

        let undo_all = || Compensation::RestorePrimaryAndDeleteIdentity {
            old_id: current.id,
            identity_id: identity_id.clone(),
        };

        let mut metadata = current.metadata.clone();
        if !metadata.is_object() {
            metadata = json!({});
        }
        metadata["is_system_user"] = json!(true);
        metadata["service_name"] = json!(app);
        metadata["service_type"] = json!(current.service_type.as_str());
        metadata["created_by"] = json!(current.created_by);
        metadata["version"] = json!(version);
        metadata["grace_period_days"] = json!(grace_period_days);

        if let Err(e) = self.identity.set_metadata(&identity_id, metadata.clone()).await {
            warn!(identity_id = %identity_id, error = %e, "Failed to tag rotated identity");
        }

        let system_user = self
            .repo
            .create(CreateSystemUser {
                name,
                application_name: app.clone(),
                email,
                identity_id: identity_id.clone(),
                description: current.description.clone(),
                service_type: current.service_type,
                created_by: current.created_by.clone(),
                metadata: Some(metadata),
            })
            .await
            .map_err(|e| (e, undo_all()))?;

        Ok((system_user, password, version))
    }

    async fn compensate(&self, compensation: Compensation) {
        let (old_id, identity_id) = match compensation {
            Compensation::RestorePrimary { old_id } => (old_id, None),
            Compensation::RestorePrimaryAndDeleteIdentity {
                old_id,
                identity_id,
            } => (old_id, Some(identity_id)),
        };

        if let Some(identity_id) = identity_id {
            self.discard_identity(&identity_id).await;
        }

        match self.repo.restore_primary(old_id).await {
            Ok(_) => warn!(system_user_id = %old_id, "Rotation failed, old credential restored"),
            Err(e) => error!(
                system_user_id = %old_id,
                error = %e,
                "Rotation failed and the old credential could not be restored"
            ),
        }
    }

    /// Deactivate every active non-primary credential of an application.
    ///
    /// Best-effort and partial-success: a credential that cannot be
    /// deactivated is logged and skipped. Session revocation failures
    /// never count against the result. Returns how many were revoked.
    pub async fn revoke_non_primary(&self, application_name: &str) -> WardenResult<u64> {
        let credentials = self.repo.list_by_application(application_name).await?;

        let mut revoked = 0;
        for credential in credentials
            .iter()
            .filter(|c| c.is_active && !c.is_primary)
        {
            if let Err(e) = self.repo.set_active(credential.id, false).await {
                warn!(
                    system_user_id = %credential.id,
                    error = %e,
                    "Failed to revoke credential, continuing"
                );
                continue;
            }
            self.revoke_sessions(credential).await;
            revoked += 1;
        }

        info!(application = application_name, revoked, "Non-primary credentials revoked");
        Ok(revoked)
    }

    /// Deactivate every credential whose grace period has ended.
    /// Idempotent: a second run finds nothing to do.
    pub async fn deactivate_expired(&self) -> WardenResult<u64> {
        let count = self.repo.deactivate_expired().await?;
        if count > 0 {
            info!(count, "Expired system users deactivated");
        }
        Ok(count)
    }

    /// Replace the secret of one credential in place, without a grace
    /// period. Existing sessions are revoked.
    pub async fn regenerate_password(&self, id: Uuid) -> WardenResult<OneTimeSecret> {
        let user = self.repo.get_by_id(id).await?;
        if !user.is_active {
            return Err(AdminError::CredentialInactive.into());
        }

        let password = secret::generate_password(&self.config);
        self.identity
            .update_secret(&user.identity_id, password.expose())
            .await?;
        self.revoke_sessions(&user).await;

        info!(system_user_id = %user.id, name = %user.name, "System user password regenerated");
        Ok(password)
    }

    /// Deactivate one credential immediately and revoke its sessions.
    pub async fn deactivate_system_user(&self, id: Uuid) -> WardenResult<SystemUser> {
        let user = self.repo.set_active(id, false).await?;
        self.revoke_sessions(&user).await;

        info!(system_user_id = %user.id, name = %user.name, "System user deactivated");
        Ok(user)
    }

    pub async fn update_system_user(
        &self,
        id: Uuid,
        input: UpdateSystemUser,
    ) -> WardenResult<SystemUser> {
        let updated = self.repo.update(id, input).await?;
        if !updated.is_active {
            self.revoke_sessions(&updated).await;
        }
        Ok(updated)
    }

    pub async fn get_system_user(&self, id: Uuid) -> WardenResult<SystemUser> {
        self.repo.get_by_id(id).await
    }

    pub async fn list_system_users(&self, active_only: bool) -> WardenResult<Vec<SystemUser>> {
        self.repo.list(active_only).await
    }

    /// Every credential version of an application, primary first.
    pub async fn get_by_application(&self, application_name: &str) -> WardenResult<Vec<SystemUser>> {
        self.repo.list_by_application(application_name).await
    }

    /// Stamp `last_used_at` after a successful authentication.
    pub async fn record_usage(&self, identity_id: &str) -> WardenResult<()> {
        self.repo.touch_last_used(identity_id).await
    }
}

/// End of a grace period of `days` starting at `from`.
fn grace_expiry(from: DateTime<Utc>, days: i64) -> WardenResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|grace| from.checked_add_signed(grace))
        .ok_or_else(|| AdminError::GracePeriodTooLong(days).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_expiry_rejects_overflow() {
        let now = Utc::now();
        assert_eq!(grace_expiry(now, 7).unwrap(), now + Duration::days(7));
        assert!(matches!(
            grace_expiry(now, 200_000_000),
            Err(WardenError::Validation { .. })
        ));
        assert!(grace_expiry(now, i64::MAX).is_err());
    }

    #[test]
    fn names_are_restricted_to_slug_characters() {
        assert!(validate_name("billing-worker_2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("Billing").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("dot.name").is_err());
    }

    #[test]
    fn timestamps_are_rfc3339_seconds() {
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.678Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(at), "2026-01-02T03:04:05Z");
    }
}
