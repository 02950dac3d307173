//! Direct membership management.

use tracing::info;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::member::{
    CreateTenantMember, MemberStatus, TenantMember, UpdateTenantMember,
};
use warden_core::repository::{
    PaginatedResult, Pagination, RoleRepository, TenantMemberRepository, TenantRepository,
};

use crate::error::AdminError;
use crate::rbac::found;

pub struct MemberService<M, T, R>
where
    M: TenantMemberRepository,
    T: TenantRepository,
    R: RoleRepository,
{
    members: M,
    tenants: T,
    roles: R,
}

impl<M, T, R> MemberService<M, T, R>
where
    M: TenantMemberRepository,
    T: TenantRepository,
    R: RoleRepository,
{
    pub fn new(members: M, tenants: T, roles: R) -> Self {
        Self {
            members,
            tenants,
            roles,
        }
    }

    /// The role must be a system role or belong to `tenant_id`.
    async fn check_role(&self, tenant_id: Uuid, role_id: Uuid) -> WardenResult<()> {
        let role = self.roles.get_by_id(role_id).await?;
        if role.tenant_id.is_some_and(|t| t != tenant_id) {
            return Err(AdminError::RoleScopeMismatch.into());
        }
        Ok(())
    }

    pub async fn add_member(
        &self,
        tenant_id: Uuid,
        user_id: &str,
        role_id: Uuid,
        invited_by: Option<String>,
    ) -> WardenResult<TenantMember> {
        self.tenants.get_by_id(tenant_id).await?;
        self.check_role(tenant_id, role_id).await?;

        if found(self.members.get_by_tenant_and_user(tenant_id, user_id).await)?.is_some() {
            return Err(AdminError::AlreadyMember.into());
        }

        let member = self
            .members
            .create(CreateTenantMember {
                tenant_id,
                user_id: user_id.to_owned(),
                role_id,
                status: MemberStatus::Active,
                invited_by,
            })
            .await
            .map_err(|e| match e {
                WardenError::AlreadyExists { .. } => AdminError::AlreadyMember.into(),
                other => other,
            })?;

        info!(tenant_id = %tenant_id, user_id, role_id = %role_id, "Member added");
        Ok(member)
    }

    pub async fn get_member(&self, tenant_id: Uuid, user_id: &str) -> WardenResult<TenantMember> {
        self.members.get_by_tenant_and_user(tenant_id, user_id).await
    }

    pub async fn list_members(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<TenantMember>> {
        self.members.list_by_tenant(tenant_id, pagination).await
    }

    pub async fn update_member(
        &self,
        id: Uuid,
        role_id: Option<Uuid>,
        status: Option<MemberStatus>,
    ) -> WardenResult<TenantMember> {
        if let Some(role_id) = role_id {
            let current = self.members.get_by_id(id).await?;
            self.check_role(current.tenant_id, role_id).await?;
        }

        let member = self
            .members
            .update(
                id,
                UpdateTenantMember {
                    role_id,
                    status,
                    invited_by: None,
                },
            )
            .await?;
        info!(member_id = %id, status = ?member.status, "Member updated");
        Ok(member)
    }

    pub async fn remove_member(&self, id: Uuid) -> WardenResult<()> {
        self.members.delete(id).await?;
        info!(member_id = %id, "Member removed");
        Ok(())
    }
}
