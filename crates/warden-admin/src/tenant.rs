//! Tenant lifecycle.
//!
//! Self-serve tenants start with their creator as an active `Admin`
//! member and are initialised right away. Managed tenants instead get a
//! pending `Admin` invitation and are initialised once it is accepted.
//! Either way the tenant stays `pending` until the initialisation task
//! calls [`TenantService::mark_active`].

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_core::dispatch::{JobDispatcher, NewTask};
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::invitation::{CreateInvitation, UserInvitation};
use warden_core::models::member::{CreateTenantMember, MemberStatus};
use warden_core::models::role::Role;
use warden_core::models::tenant::{CreateTenant, Tenant, TenantStatus, UpdateTenant};
use warden_core::repository::{
    InvitationRepository, PaginatedResult, Pagination, RoleRepository, TenantMemberRepository,
    TenantRepository,
};

use crate::config::InvitationConfig;
use crate::error::AdminError;
use crate::invitation::normalize_email;
use crate::rbac::{ADMIN_ROLE, found};
use crate::secret;

/// Input shared by both tenant creation paths.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub slug: String,
    pub metadata: Option<serde_json::Value>,
    /// Identity-provider user id of the caller.
    pub created_by: String,
}

/// Trim, lowercase, turn whitespace and underscores into `-` and
/// collapse repeated or edge hyphens.
pub fn normalize_slug(raw: &str) -> Result<String, AdminError> {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        let c = if c.is_whitespace() || c == '_' { '-' } else { c };
        if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(c);
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        return Err(AdminError::InvalidSlug(raw.to_owned()));
    }
    Ok(slug)
}

pub struct TenantService<T, R, M, V, D>
where
    T: TenantRepository,
    R: RoleRepository,
    M: TenantMemberRepository,
    V: InvitationRepository,
    D: JobDispatcher,
{
    tenants: T,
    roles: R,
    members: M,
    invitations: V,
    dispatcher: D,
    invitation_config: InvitationConfig,
}

impl<T, R, M, V, D> TenantService<T, R, M, V, D>
where
    T: TenantRepository,
    R: RoleRepository,
    M: TenantMemberRepository,
    V: InvitationRepository,
    D: JobDispatcher,
{
    pub fn new(
        tenants: T,
        roles: R,
        members: M,
        invitations: V,
        dispatcher: D,
        invitation_config: InvitationConfig,
    ) -> Self {
        Self {
            tenants,
            roles,
            members,
            invitations,
            dispatcher,
            invitation_config,
        }
    }

    async fn admin_role(&self) -> WardenResult<Role> {
        found(self.roles.get_by_name(ADMIN_ROLE, None).await)?
            .ok_or_else(|| AdminError::MissingSystemRole(ADMIN_ROLE.into()).into())
    }

    async fn insert_tenant(&self, input: NewTenant) -> WardenResult<Tenant> {
        if input.name.trim().is_empty() {
            return Err(AdminError::InvalidName("tenant name must not be empty".into()).into());
        }
        let slug = normalize_slug(&input.slug)?;

        if found(self.tenants.get_by_slug(&slug).await)?.is_some() {
            return Err(WardenError::already_exists("tenant"));
        }

        self.tenants
            .create(CreateTenant {
                name: input.name.trim().to_owned(),
                slug,
                status: TenantStatus::Pending,
                metadata: input.metadata,
                created_by: input.created_by,
            })
            .await
    }

    async fn enqueue_initialization(&self, tenant_id: Uuid) {
        if let Err(e) = self
            .dispatcher
            .enqueue(NewTask::tenant_initialization(tenant_id))
            .await
        {
            warn!(tenant_id = %tenant_id, error = %e, "Failed to queue tenant initialisation");
        }
    }

    /// Soft-delete a tenant whose first admin could not be attached, so
    /// no ownerless `pending` tenant is left behind.
    async fn abandon(&self, tenant: &Tenant, cause: &WardenError) {
        let deleted = UpdateTenant {
            status: Some(TenantStatus::Deleted),
            ..Default::default()
        };
        match self.tenants.update(tenant.id, deleted).await {
            Ok(_) => warn!(
                tenant_id = %tenant.id,
                slug = %tenant.slug,
                error = %cause,
                "Tenant abandoned: first admin could not be attached"
            ),
            Err(e) => error!(
                tenant_id = %tenant.id,
                slug = %tenant.slug,
                error = %e,
                "Could not abandon ownerless tenant; manual cleanup required"
            ),
        }
    }

    /// Create a tenant with the caller as its first `Admin` member and
    /// queue its initialisation.
    pub async fn create_tenant(&self, input: NewTenant) -> WardenResult<Tenant> {
        let admin = self.admin_role().await?;
        let creator = input.created_by.clone();
        let tenant = self.insert_tenant(input).await?;

        if let Err(e) = self
            .members
            .create(CreateTenantMember {
                tenant_id: tenant.id,
                user_id: creator.clone(),
                role_id: admin.id,
                status: MemberStatus::Active,
                invited_by: None,
            })
            .await
        {
            self.abandon(&tenant, &e).await;
            return Err(e);
        }

        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            created_by = %creator,
            "Tenant created"
        );

        self.enqueue_initialization(tenant.id).await;
        Ok(tenant)
    }

    /// Create a tenant on someone else's behalf. `admin_email` receives
    /// a pending `Admin` invitation; initialisation waits for its
    /// acceptance.
    pub async fn create_managed_tenant(
        &self,
        input: NewTenant,
        admin_email: &str,
    ) -> WardenResult<(Tenant, UserInvitation)> {
        let email = normalize_email(admin_email)?;
        let admin = self.admin_role().await?;
        let invited_by = input.created_by.clone();
        let tenant = self.insert_tenant(input).await?;

        let invitation = match self
            .invitations
            .create(CreateInvitation {
                tenant_id: tenant.id,
                email,
                invited_by,
                role_id: admin.id,
                token: secret::generate_invitation_token(),
                expires_at: Utc::now() + Duration::hours(self.invitation_config.expiry_hours),
            })
            .await
        {
            Ok(invitation) => invitation,
            Err(e) => {
                self.abandon(&tenant, &e).await;
                return Err(e);
            }
        };

        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            invitation_id = %invitation.id,
            "Managed tenant created"
        );

        if let Err(e) = self
            .dispatcher
            .enqueue(NewTask::invitation_email(invitation.id))
            .await
        {
            warn!(invitation_id = %invitation.id, error = %e, "Failed to queue invitation email");
        }

        Ok((tenant, invitation))
    }

    pub async fn get_tenant(&self, id: Uuid) -> WardenResult<Tenant> {
        self.tenants.get_by_id(id).await
    }

    pub async fn get_tenant_by_slug(&self, slug: &str) -> WardenResult<Tenant> {
        self.tenants.get_by_slug(&normalize_slug(slug)?).await
    }

    /// Tenants in which the user holds an active membership.
    pub async fn get_user_tenants(
        &self,
        user_id: &str,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<Tenant>> {
        self.tenants.list_by_member(user_id, pagination).await
    }

    pub async fn list_tenants(&self, pagination: Pagination) -> WardenResult<PaginatedResult<Tenant>> {
        self.tenants.list(pagination).await
    }

    pub async fn update_tenant(&self, id: Uuid, input: UpdateTenant) -> WardenResult<Tenant> {
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AdminError::InvalidName("tenant name must not be empty".into()).into());
        }
        let tenant = self.tenants.update(id, input).await?;
        info!(tenant_id = %id, status = ?tenant.status, "Tenant updated");
        Ok(tenant)
    }

    /// Soft delete.
    pub async fn delete_tenant(&self, id: Uuid) -> WardenResult<Tenant> {
        let tenant = self
            .tenants
            .update(
                id,
                UpdateTenant {
                    status: Some(TenantStatus::Deleted),
                    ..Default::default()
                },
            )
            .await?;
        info!(tenant_id = %id, "Tenant deleted");
        Ok(tenant)
    }

    pub async fn get_tenant_status(&self, id: Uuid) -> WardenResult<TenantStatus> {
        Ok(self.tenants.get_by_id(id).await?.status)
    }

    /// Move a tenant to `active`. A tenant that is already active is
    /// returned unchanged.
    pub async fn mark_active(&self, id: Uuid) -> WardenResult<Tenant> {
        let tenant = self.tenants.get_by_id(id).await?;
        if tenant.status == TenantStatus::Active {
            return Ok(tenant);
        }
        if tenant.status == TenantStatus::Deleted {
            return Err(WardenError::invalid_state("tenant has been deleted"));
        }

        let tenant = self
            .tenants
            .update(
                id,
                UpdateTenant {
                    status: Some(TenantStatus::Active),
                    ..Default::default()
                },
            )
            .await?;
        info!(tenant_id = %id, "Tenant activated");
        Ok(tenant)
    }
}
