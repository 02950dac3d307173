//! Invitation state machine.
//!
//! `pending` is the only live state. It moves to `accepted` or
//! `cancelled` on request, and to `expired` once `expires_at` has
//! passed: either lazily when someone tries to accept it, or eagerly
//! through [`InvitationService::expire_old_invitations`].

use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::dispatch::{JobDispatcher, NewTask};
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::invitation::{CreateInvitation, InvitationStatus, UserInvitation};
use warden_core::models::member::{
    CreateTenantMember, MemberStatus, TenantMember, UpdateTenantMember,
};
use warden_core::models::tenant::TenantStatus;
use warden_core::repository::{
    InvitationRepository, PaginatedResult, Pagination, RoleRepository, TenantMemberRepository,
    TenantRepository,
};

use crate::config::InvitationConfig;
use crate::error::AdminError;
use crate::secret;

/// Input for [`InvitationService::create_invitation`].
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub tenant_id: Uuid,
    pub email: String,
    pub role_id: Uuid,
    pub invited_by: String,
}

/// Trim and lowercase an email address, rejecting obvious garbage.
pub(crate) fn normalize_email(email: &str) -> Result<String, AdminError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AdminError::InvalidEmail(email)),
    }
}

fn status_label(status: InvitationStatus) -> &'static str {
    match status {
        InvitationStatus::Pending => "pending",
        InvitationStatus::Accepted => "already accepted",
        InvitationStatus::Cancelled => "cancelled",
        InvitationStatus::Expired => "expired",
    }
}

/// How the membership for an accepted invitation came about, so a lost
/// race can be undone precisely.
enum Joined {
    Created(TenantMember),
    Reactivated {
        member: TenantMember,
        previous_role: Uuid,
    },
}

/// Issues, accepts, cancels and expires tenant invitations.
pub struct InvitationService<V, T, R, M, D>
where
    V: InvitationRepository,
    T: TenantRepository,
    R: RoleRepository,
    M: TenantMemberRepository,
    D: JobDispatcher,
{
    invitations: V,
    tenants: T,
    roles: R,
    members: M,
    dispatcher: D,
    config: InvitationConfig,
}

impl<V, T, R, M, D> InvitationService<V, T, R, M, D>
where
    V: InvitationRepository,
    T: TenantRepository,
    R: RoleRepository,
    M: TenantMemberRepository,
    D: JobDispatcher,
{
    pub fn new(
        invitations: V,
        tenants: T,
        roles: R,
        members: M,
        dispatcher: D,
        config: InvitationConfig,
    ) -> Self {
        Self {
            invitations,
            tenants,
            roles,
            members,
            dispatcher,
            config,
        }
    }

    /// Create a pending invitation and queue its email.
    ///
    /// Fails with `Conflict` while another pending, unexpired invitation
    /// exists for the same tenant and email. A failure to queue the
    /// email is logged only: the token stays valid and can be shared by
    /// other means.
    pub async fn create_invitation(&self, input: NewInvitation) -> WardenResult<UserInvitation> {
        let email = normalize_email(&input.email)?;

        self.tenants.get_by_id(input.tenant_id).await?;
        let role = self.roles.get_by_id(input.role_id).await?;
        if role.tenant_id.is_some_and(|t| t != input.tenant_id) {
            return Err(AdminError::RoleScopeMismatch.into());
        }

        if self
            .invitations
            .get_pending_for(input.tenant_id, &email)
            .await?
            .is_some()
        {
            return Err(WardenError::conflict(
                "a pending invitation already exists for this email",
            ));
        }

        let invitation = self
            .invitations
            .create(CreateInvitation {
                tenant_id: input.tenant_id,
                email,
                invited_by: input.invited_by,
                role_id: input.role_id,
                token: secret::generate_invitation_token(),
                expires_at: Utc::now() + Duration::hours(self.config.expiry_hours),
            })
            .await?;

        info!(
            invitation_id = %invitation.id,
            tenant_id = %invitation.tenant_id,
            email = %invitation.email,
            "Invitation created"
        );

        if let Err(e) = self
            .dispatcher
            .enqueue(NewTask::invitation_email(invitation.id))
            .await
        {
            warn!(invitation_id = %invitation.id, error = %e, "Failed to queue invitation email");
        }

        Ok(invitation)
    }

    /// Accept an invitation on behalf of `user_id`.
    ///
    /// Creates the membership (or reactivates an inactive one) with the
    /// invitation's role, then marks the invitation accepted. The first
    /// acceptance into a tenant that is still `pending` queues its
    /// initialisation.
    pub async fn accept_invitation(&self, token: &str, user_id: &str) -> WardenResult<TenantMember> {
        let invitation = self.invitations.get_by_token(token).await?;

        if !invitation.is_pending() {
            return Err(AdminError::InvitationNotPending(status_label(invitation.status)).into());
        }
        if invitation.is_expired_at(Utc::now()) {
            if let Err(e) = self.invitations.mark_expired(invitation.id).await {
                warn!(invitation_id = %invitation.id, error = %e, "Failed to expire invitation");
            }
            return Err(AdminError::InvitationExpired.into());
        }

        let joined = self.join(&invitation, user_id).await?;

        match self.invitations.mark_accepted(invitation.id).await {
            Ok(_) => {}
            Err(WardenError::NotFound { .. }) => {
                // Accepted or cancelled concurrently.
                self.undo_join(joined).await;
                return Err(AdminError::InvitationNotPending("no longer pending").into());
            }
            Err(e) => {
                self.undo_join(joined).await;
                return Err(e);
            }
        }

        let member = match joined {
            Joined::Created(member) | Joined::Reactivated { member, .. } => member,
        };

        info!(
            invitation_id = %invitation.id,
            tenant_id = %invitation.tenant_id,
            user_id,
            "Invitation accepted"
        );

        match self.tenants.get_by_id(invitation.tenant_id).await {
            Ok(tenant) if tenant.status == TenantStatus::Pending => {
                if let Err(e) = self
                    .dispatcher
                    .enqueue(NewTask::tenant_initialization(tenant.id))
                    .await
                {
                    warn!(tenant_id = %tenant.id, error = %e, "Failed to queue tenant initialisation");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(tenant_id = %invitation.tenant_id, error = %e, "Could not load tenant after acceptance");
            }
        }

        Ok(member)
    }

    async fn join(&self, invitation: &UserInvitation, user_id: &str) -> WardenResult<Joined> {
        match self
            .members
            .get_by_tenant_and_user(invitation.tenant_id, user_id)
            .await
        {
            Ok(existing) if existing.is_active() => Err(AdminError::AlreadyMember.into()),
            Ok(existing) => {
                let member = self
                    .members
                    .update(
                        existing.id,
                        UpdateTenantMember {
                            role_id: Some(invitation.role_id),
                            status: Some(MemberStatus::Active),
                            invited_by: Some(invitation.invited_by.clone()),
                        },
                    )
                    .await?;
                Ok(Joined::Reactivated {
                    member,
                    previous_role: existing.role_id,
                })
            }
            Err(WardenError::NotFound { .. }) => {
                let member = self
                    .members
                    .create(CreateTenantMember {
                        tenant_id: invitation.tenant_id,
                        user_id: user_id.to_owned(),
                        role_id: invitation.role_id,
                        status: MemberStatus::Active,
                        invited_by: Some(invitation.invited_by.clone()),
                    })
                    .await
                    .map_err(|e| match e {
                        // Joined through another path in the meantime.
                        WardenError::AlreadyExists { .. } => AdminError::AlreadyMember.into(),
                        other => other,
                    })?;
                Ok(Joined::Created(member))
            }
            Err(e) => Err(e),
        }
    }

    async fn undo_join(&self, joined: Joined) {
        let result = match joined {
            Joined::Created(member) => self.members.delete(member.id).await,
            Joined::Reactivated {
                member,
                previous_role,
            } => self
                .members
                .update(
                    member.id,
                    UpdateTenantMember {
                        role_id: Some(previous_role),
                        status: Some(MemberStatus::Inactive),
                        invited_by: None,
                    },
                )
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Could not undo membership after a failed acceptance");
        }
    }

    /// Cancel a pending invitation.
    pub async fn cancel_invitation(&self, id: Uuid) -> WardenResult<UserInvitation> {
        let invitation = self.invitations.get_by_id(id).await?;
        if !invitation.is_pending() {
            return Err(AdminError::InvitationNotPending(status_label(invitation.status)).into());
        }

        let cancelled = self
            .invitations
            .mark_cancelled(id)
            .await
            .map_err(|e| match e {
                WardenError::NotFound { .. } => {
                    AdminError::InvitationNotPending("no longer pending").into()
                }
                other => other,
            })?;

        info!(invitation_id = %id, "Invitation cancelled");
        Ok(cancelled)
    }

    /// Claim every outstanding invitation addressed to a newly
    /// registered email. Failures are logged and skipped; the
    /// memberships that were created are returned.
    pub async fn check_and_accept_pending_invitations(
        &self,
        email: &str,
        user_id: &str,
    ) -> WardenResult<Vec<TenantMember>> {
        let email = normalize_email(email)?;
        let pending = self.invitations.list_pending_by_email(&email).await?;

        let mut joined = Vec::new();
        for invitation in pending {
            match self.accept_invitation(&invitation.token, user_id).await {
                Ok(member) => joined.push(member),
                Err(e) => warn!(
                    invitation_id = %invitation.id,
                    user_id,
                    error = %e,
                    "Could not auto-accept invitation"
                ),
            }
        }
        Ok(joined)
    }

    pub async fn get_invitation(&self, id: Uuid) -> WardenResult<UserInvitation> {
        self.invitations.get_by_id(id).await
    }

    pub async fn get_by_token(&self, token: &str) -> WardenResult<UserInvitation> {
        self.invitations.get_by_token(token).await
    }

    pub async fn list_tenant_invitations(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<UserInvitation>> {
        self.invitations.list_by_tenant(tenant_id, pagination).await
    }

    /// Flip every overdue pending invitation to `expired`.
    pub async fn expire_old_invitations(&self) -> WardenResult<u64> {
        let count = self.invitations.expire_stale().await?;
        if count > 0 {
            info!(count, "Stale invitations expired");
        }
        Ok(count)
    }
}
