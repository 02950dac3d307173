//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Role and policy lookups take a
//! `scope`: `Some(tenant_id)` for tenant-owned entities, `None` for
//! system-wide ones.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WardenResult;
use crate::models::{
    invitation::{CreateInvitation, UserInvitation},
    member::{CreateTenantMember, TenantMember, UpdateTenantMember},
    permission::{CreatePermission, Permission},
    platform_admin::{CreatePlatformAdmin, PlatformAdmin},
    policy::{CreatePolicy, Policy, UpdatePolicy},
    role::{CreateRole, Role, UpdateRole},
    system_user::{CreateSystemUser, SystemUser, UpdateSystemUser},
    tenant::{CreateTenant, Tenant, UpdateTenant},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    /// Build from a 1-based page number and a page size.
    pub fn page(page: u64, page_size: u64) -> Self {
        let limit = page_size.clamp(1, 100);
        Self {
            offset: page.saturating_sub(1) * limit,
            limit,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// RBAC (global, optionally tenant-scoped)
// ---------------------------------------------------------------------------

pub trait PermissionRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = WardenResult<Permission>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Permission>> + Send;
    fn get_by_triple(
        &self,
        service: &str,
        entity: &str,
        action: &str,
    ) -> impl Future<Output = WardenResult<Permission>> + Send;
    fn list_all(&self) -> impl Future<Output = WardenResult<Vec<Permission>>> + Send;
    fn list_by_service(
        &self,
        service: &str,
    ) -> impl Future<Output = WardenResult<Vec<Permission>>> + Send;
    /// Deletes the permission and every policy link pointing at it.
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
}

pub trait PolicyRepository: Send + Sync {
    fn create(&self, input: CreatePolicy) -> impl Future<Output = WardenResult<Policy>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Policy>> + Send;
    /// Exact-scope lookup.
    fn get_by_name(
        &self,
        name: &str,
        scope: Option<Uuid>,
    ) -> impl Future<Output = WardenResult<Policy>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdatePolicy,
    ) -> impl Future<Output = WardenResult<Policy>> + Send;
    /// Deletes the policy, its permission links and its role links.
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    /// Tenant-owned plus system policies for `Some`, system only for `None`.
    fn list(&self, scope: Option<Uuid>) -> impl Future<Output = WardenResult<Vec<Policy>>> + Send;
    /// Idempotent: an existing link is left untouched.
    fn attach_permission(
        &self,
        policy_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = WardenResult<()>> + Send;
    fn detach_permission(
        &self,
        policy_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = WardenResult<()>> + Send;
    fn get_permissions(
        &self,
        policy_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<Permission>>> + Send;
}

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = WardenResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Role>> + Send;
    /// Exact-scope lookup.
    fn get_by_name(
        &self,
        name: &str,
        scope: Option<Uuid>,
    ) -> impl Future<Output = WardenResult<Role>> + Send;
    fn update(&self, id: Uuid, input: UpdateRole)
    -> impl Future<Output = WardenResult<Role>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    fn list(&self, scope: Option<Uuid>) -> impl Future<Output = WardenResult<Vec<Role>>> + Send;
    /// Idempotent: an existing link is left untouched.
    fn attach_policy(
        &self,
        role_id: Uuid,
        policy_id: Uuid,
    ) -> impl Future<Output = WardenResult<()>> + Send;
    fn detach_policy(
        &self,
        role_id: Uuid,
        policy_id: Uuid,
    ) -> impl Future<Output = WardenResult<()>> + Send;
    fn get_policies(&self, role_id: Uuid)
    -> impl Future<Output = WardenResult<Vec<Policy>>> + Send;
    /// Union of the permissions of every attached policy, deduplicated.
    fn get_effective_permissions(
        &self,
        role_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<Permission>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenants, memberships & invitations
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    fn create(&self, input: CreateTenant) -> impl Future<Output = WardenResult<Tenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Tenant>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = WardenResult<Tenant>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateTenant,
    ) -> impl Future<Output = WardenResult<Tenant>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Tenant>>> + Send;
    /// Tenants in which `user_id` holds an active membership.
    fn list_by_member(
        &self,
        user_id: &str,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Tenant>>> + Send;
}

pub trait TenantMemberRepository: Send + Sync {
    fn create(
        &self,
        input: CreateTenantMember,
    ) -> impl Future<Output = WardenResult<TenantMember>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<TenantMember>> + Send;
    fn get_by_tenant_and_user(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> impl Future<Output = WardenResult<TenantMember>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateTenantMember,
    ) -> impl Future<Output = WardenResult<TenantMember>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<TenantMember>>> + Send;
    fn list_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = WardenResult<Vec<TenantMember>>> + Send;
    fn count_by_role(&self, role_id: Uuid) -> impl Future<Output = WardenResult<u64>> + Send;
}

pub trait InvitationRepository: Send + Sync {
    fn create(
        &self,
        input: CreateInvitation,
    ) -> impl Future<Output = WardenResult<UserInvitation>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<UserInvitation>> + Send;
    fn get_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = WardenResult<UserInvitation>> + Send;
    /// Pending, unexpired invitations addressed to `email`.
    fn list_pending_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = WardenResult<Vec<UserInvitation>>> + Send;
    /// The pending, unexpired invitation for (tenant, email), if any.
    fn get_pending_for(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> impl Future<Output = WardenResult<Option<UserInvitation>>> + Send;
    /// Moves a pending invitation to `accepted`. `NotFound` when the
    /// invitation is missing or no longer pending.
    fn mark_accepted(&self, id: Uuid) -> impl Future<Output = WardenResult<UserInvitation>> + Send;
    /// Moves a pending invitation to `cancelled`. `NotFound` when the
    /// invitation is missing or no longer pending.
    fn mark_cancelled(
        &self,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<UserInvitation>> + Send;
    /// Moves a pending invitation to `expired`. `NotFound` when the
    /// invitation is missing or no longer pending.
    fn mark_expired(&self, id: Uuid) -> impl Future<Output = WardenResult<UserInvitation>> + Send;
    fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<UserInvitation>>> + Send;
    /// Flips every pending invitation past its expiry to `expired`.
    fn expire_stale(&self) -> impl Future<Output = WardenResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Platform admins
// ---------------------------------------------------------------------------

pub trait PlatformAdminRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePlatformAdmin,
    ) -> impl Future<Output = WardenResult<PlatformAdmin>> + Send;
    fn get_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = WardenResult<PlatformAdmin>> + Send;
    /// Newest first.
    fn list(&self) -> impl Future<Output = WardenResult<Vec<PlatformAdmin>>> + Send;
    /// `NotFound` when the user holds no entry.
    fn delete(&self, user_id: &str) -> impl Future<Output = WardenResult<()>> + Send;
    fn exists(&self, user_id: &str) -> impl Future<Output = WardenResult<bool>> + Send;
}

// ---------------------------------------------------------------------------
// System users
// ---------------------------------------------------------------------------

pub trait SystemUserRepository: Send + Sync {
    fn create(
        &self,
        input: CreateSystemUser,
    ) -> impl Future<Output = WardenResult<SystemUser>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<SystemUser>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = WardenResult<SystemUser>> + Send;
    fn get_by_identity_id(
        &self,
        identity_id: &str,
    ) -> impl Future<Output = WardenResult<SystemUser>> + Send;
    /// Newest first.
    fn list(
        &self,
        active_only: bool,
    ) -> impl Future<Output = WardenResult<Vec<SystemUser>>> + Send;
    /// Primary first, then newest first.
    fn list_by_application(
        &self,
        application_name: &str,
    ) -> impl Future<Output = WardenResult<Vec<SystemUser>>> + Send;
    fn count_by_application(
        &self,
        application_name: &str,
    ) -> impl Future<Output = WardenResult<u64>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateSystemUser,
    ) -> impl Future<Output = WardenResult<SystemUser>> + Send;
    /// `is_primary = false`, `expires_at = Some(expires_at)`.
    fn demote(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<SystemUser>> + Send;
    /// `is_primary = true`, `expires_at = None`.
    fn restore_primary(&self, id: Uuid) -> impl Future<Output = WardenResult<SystemUser>> + Send;
    fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = WardenResult<SystemUser>> + Send;
    /// Deactivates every active credential whose expiry has passed.
    fn deactivate_expired(&self) -> impl Future<Output = WardenResult<u64>> + Send;
    /// Stamps `last_used_at`. Unknown identities are ignored.
    fn touch_last_used(&self, identity_id: &str) -> impl Future<Output = WardenResult<()>> + Send;
}
