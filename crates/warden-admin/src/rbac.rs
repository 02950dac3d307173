//! RBAC service: permissions, policies, roles and permission checks.
//!
//! Permissions are `(service, entity, action)` triples. Policies bundle
//! permissions; roles bundle policies. A tenant member holds exactly one
//! role, and a check passes iff the triple is reachable through that
//! role's policies. Matching is exact; there are no wildcards.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::permission::{CreatePermission, Permission, parse_permission_key};
use warden_core::models::policy::{CreatePolicy, Policy, PolicyDetail, UpdatePolicy};
use warden_core::models::role::{CreateRole, Role, RoleDetail, RoleType, UpdateRole};
use warden_core::repository::{
    PermissionRepository, PolicyRepository, RoleRepository, TenantMemberRepository,
};

use crate::error::AdminError;

/// Name of the system role granted to tenant creators and invited owners.
pub const ADMIN_ROLE: &str = "Admin";
/// Name of the default system role for ordinary members.
pub const MEMBER_ROLE: &str = "Member";

/// RBAC service.
///
/// Generic over repository implementations so that the service layer
/// has no dependency on the database crate.
pub struct RbacService<P, Q, R, M>
where
    P: PermissionRepository,
    Q: PolicyRepository,
    R: RoleRepository,
    M: TenantMemberRepository,
{
    permissions: P,
    policies: Q,
    roles: R,
    members: M,
}

fn require_name(name: &str) -> Result<(), AdminError> {
    if name.trim().is_empty() {
        return Err(AdminError::InvalidName("name must not be empty".into()));
    }
    Ok(())
}

/// `Ok(None)` for a missing entity, `Err` for anything else.
pub(crate) fn found<T>(result: WardenResult<T>) -> WardenResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(WardenError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

impl<P, Q, R, M> RbacService<P, Q, R, M>
where
    P: PermissionRepository,
    Q: PolicyRepository,
    R: RoleRepository,
    M: TenantMemberRepository,
{
    pub fn new(permissions: P, policies: Q, roles: R, members: M) -> Self {
        Self {
            permissions,
            policies,
            roles,
            members,
        }
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    pub async fn create_permission(&self, input: CreatePermission) -> WardenResult<Permission> {
        for (field, value) in [
            ("service", &input.service),
            ("entity", &input.entity),
            ("action", &input.action),
        ] {
            if value.is_empty() || value.contains(':') {
                return Err(AdminError::InvalidName(format!(
                    "{field} must be non-empty and must not contain ':'"
                ))
                .into());
            }
        }

        let existing = found(
            self.permissions
                .get_by_triple(&input.service, &input.entity, &input.action)
                .await,
        )?;
        if existing.is_some() {
            return Err(WardenError::already_exists("permission"));
        }

        let permission = self.permissions.create(input).await?;
        info!(permission = %permission.key(), "Permission created");
        Ok(permission)
    }

    pub async fn get_permission(&self, id: Uuid) -> WardenResult<Permission> {
        self.permissions.get_by_id(id).await
    }

    pub async fn list_permissions(&self) -> WardenResult<Vec<Permission>> {
        self.permissions.list_all().await
    }

    pub async fn list_permissions_by_service(&self, service: &str) -> WardenResult<Vec<Permission>> {
        self.permissions.list_by_service(service).await
    }

    /// Deletes the permission and unlinks it from every policy.
    pub async fn delete_permission(&self, id: Uuid) -> WardenResult<()> {
        self.permissions.delete(id).await?;
        info!(permission_id = %id, "Permission deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Policies
    // -----------------------------------------------------------------------

    pub async fn create_policy(&self, input: CreatePolicy) -> WardenResult<Policy> {
        require_name(&input.name)?;

        if found(self.policies.get_by_name(&input.name, input.tenant_id).await)?.is_some() {
            return Err(WardenError::already_exists("policy"));
        }

        let policy = self.policies.create(input).await?;
        info!(policy_id = %policy.id, name = %policy.name, "Policy created");
        Ok(policy)
    }

    /// The policy together with its permissions.
    pub async fn get_policy(&self, id: Uuid) -> WardenResult<PolicyDetail> {
        let policy = self.policies.get_by_id(id).await?;
        let permissions = self.policies.get_permissions(id).await?;
        Ok(PolicyDetail {
            policy,
            permissions,
        })
    }

    pub async fn update_policy(&self, id: Uuid, input: UpdatePolicy) -> WardenResult<Policy> {
        let current = self.policies.get_by_id(id).await?;

        if let Some(name) = &input.name {
            require_name(name)?;
            if *name != current.name {
                let clash = found(self.policies.get_by_name(name, current.tenant_id).await)?;
                if clash.is_some() {
                    return Err(WardenError::already_exists("policy"));
                }
            }
        }

        self.policies.update(id, input).await
    }

    /// Deletes the policy after unlinking it from roles and permissions.
    pub async fn delete_policy(&self, id: Uuid) -> WardenResult<()> {
        self.policies.delete(id).await?;
        info!(policy_id = %id, "Policy deleted");
        Ok(())
    }

    pub async fn list_policies(&self, scope: Option<Uuid>) -> WardenResult<Vec<Policy>> {
        self.policies.list(scope).await
    }

    pub async fn get_policy_permissions(&self, policy_id: Uuid) -> WardenResult<Vec<Permission>> {
        self.policies.get_by_id(policy_id).await?;
        self.policies.get_permissions(policy_id).await
    }

    /// Link permissions to a policy.
    ///
    /// The policy and every permission are resolved before anything is
    /// linked; the first missing id fails the call with `NotFound`.
    /// Linking is idempotent. A storage failure part-way through leaves
    /// the links made so far in place; retrying the call completes it.
    pub async fn assign_permissions(
        &self,
        policy_id: Uuid,
        permission_ids: &[Uuid],
    ) -> WardenResult<()> {
        self.policies.get_by_id(policy_id).await?;
        for id in permission_ids {
            self.permissions.get_by_id(*id).await?;
        }

        for id in permission_ids {
            self.policies.attach_permission(policy_id, *id).await?;
        }

        info!(
            policy_id = %policy_id,
            count = permission_ids.len(),
            "Permissions assigned to policy"
        );
        Ok(())
    }

    /// Unlink one permission. Unlinking an absent link is not an error.
    pub async fn revoke_permission(&self, policy_id: Uuid, permission_id: Uuid) -> WardenResult<()> {
        self.policies.detach_permission(policy_id, permission_id).await?;
        debug!(policy_id = %policy_id, permission_id = %permission_id, "Permission revoked from policy");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    /// Roles are unique by name within their scope; system roles
    /// (`tenant_id = None`) form their own namespace.
    pub async fn create_role(&self, input: CreateRole) -> WardenResult<Role> {
        require_name(&input.name)?;

        if found(self.roles.get_by_name(&input.name, input.tenant_id).await)?.is_some() {
            return Err(WardenError::already_exists("role"));
        }

        let role = self.roles.create(input).await?;
        info!(role_id = %role.id, name = %role.name, system = role.is_system, "Role created");
        Ok(role)
    }

    /// The role together with its policies.
    pub async fn get_role(&self, id: Uuid) -> WardenResult<RoleDetail> {
        let role = self.roles.get_by_id(id).await?;
        let policies = self.roles.get_policies(id).await?;
        Ok(RoleDetail { role, policies })
    }

    pub async fn update_role(&self, id: Uuid, input: UpdateRole) -> WardenResult<Role> {
        let current = self.roles.get_by_id(id).await?;

        if let Some(name) = &input.name {
            require_name(name)?;
            if *name != current.name {
                let clash = found(self.roles.get_by_name(name, current.tenant_id).await)?;
                if clash.is_some() {
                    return Err(WardenError::already_exists("role"));
                }
            }
        }

        self.roles.update(id, input).await
    }

    /// Refuses while any tenant member still holds the role.
    pub async fn delete_role(&self, id: Uuid) -> WardenResult<()> {
        self.roles.get_by_id(id).await?;

        let holders = self.members.count_by_role(id).await?;
        if holders > 0 {
            return Err(AdminError::RoleInUse(holders).into());
        }

        self.roles.delete(id).await?;
        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    pub async fn list_roles(&self, scope: Option<Uuid>) -> WardenResult<Vec<Role>> {
        self.roles.list(scope).await
    }

    pub async fn get_role_policies(&self, role_id: Uuid) -> WardenResult<Vec<Policy>> {
        self.roles.get_by_id(role_id).await?;
        self.roles.get_policies(role_id).await
    }

    /// Link policies to a role.
    ///
    /// Same contract as [`Self::assign_permissions`]. In addition each
    /// policy must be system-wide or owned by the role's tenant.
    pub async fn assign_policies(&self, role_id: Uuid, policy_ids: &[Uuid]) -> WardenResult<()> {
        let role = self.roles.get_by_id(role_id).await?;
        for id in policy_ids {
            let policy = self.policies.get_by_id(*id).await?;
            if !role.accepts_policy_scope(policy.tenant_id) {
                return Err(AdminError::PolicyScopeMismatch.into());
            }
        }

        for id in policy_ids {
            self.roles.attach_policy(role_id, *id).await?;
        }

        info!(role_id = %role_id, count = policy_ids.len(), "Policies assigned to role");
        Ok(())
    }

    pub async fn revoke_policy(&self, role_id: Uuid, policy_id: Uuid) -> WardenResult<()> {
        self.roles.detach_policy(role_id, policy_id).await?;
        debug!(role_id = %role_id, policy_id = %policy_id, "Policy revoked from role");
        Ok(())
    }

    /// Return the system role `name`, creating it when missing.
    pub async fn ensure_system_role(
        &self,
        name: &str,
        role_type: RoleType,
        description: &str,
    ) -> WardenResult<Role> {
        if let Some(role) = found(self.roles.get_by_name(name, None).await)? {
            return Ok(role);
        }

        let created = self
            .roles
            .create(CreateRole {
                name: name.to_owned(),
                role_type,
                description: description.to_owned(),
                tenant_id: None,
            })
            .await;

        match created {
            Ok(role) => {
                info!(role_id = %role.id, name, "System role created");
                Ok(role)
            }
            // Another process created it first.
            Err(WardenError::AlreadyExists { .. }) => self.roles.get_by_name(name, None).await,
            Err(e) => Err(e),
        }
    }

    /// Ensure the built-in `Admin` and `Member` system roles exist.
    pub async fn bootstrap_defaults(&self) -> WardenResult<(Role, Role)> {
        let admin = self
            .ensure_system_role(ADMIN_ROLE, RoleType::Tenant, "Full control over a tenant")
            .await?;
        let member = self
            .ensure_system_role(MEMBER_ROLE, RoleType::Tenant, "Default tenant member")
            .await?;
        Ok((admin, member))
    }

    // -----------------------------------------------------------------------
    // Authorization
    // -----------------------------------------------------------------------

    /// Whether `user_id` may perform `service:entity:action` in `tenant_id`.
    ///
    /// Returns `Ok(false)` when the user has no membership, the
    /// membership is not active, or the role no longer exists. Storage
    /// faults are returned as errors and never read as a denial.
    pub async fn check_user_permission(
        &self,
        tenant_id: Uuid,
        user_id: &str,
        service: &str,
        entity: &str,
        action: &str,
    ) -> WardenResult<bool> {
        let permissions = match self.resolve_permissions(tenant_id, user_id).await {
            Ok(permissions) => permissions,
            Err(e) if e.is_storage_fault() => return Err(e),
            Err(e) => {
                warn!(
                    tenant_id = %tenant_id,
                    user_id,
                    error = %e,
                    "Permission lookup failed, denying"
                );
                return Ok(false);
            }
        };

        let allowed = permissions.iter().any(|p| p.matches(service, entity, action));
        debug!(
            tenant_id = %tenant_id,
            user_id,
            service,
            entity,
            action,
            allowed,
            "Permission checked"
        );
        Ok(allowed)
    }

    /// [`Self::check_user_permission`] for a `service:entity:action` key.
    pub async fn has_permission_key(
        &self,
        tenant_id: Uuid,
        user_id: &str,
        key: &str,
    ) -> WardenResult<bool> {
        let (service, entity, action) = parse_permission_key(key)
            .ok_or_else(|| AdminError::InvalidPermissionKey(key.to_owned()))?;
        self.check_user_permission(tenant_id, user_id, service, entity, action)
            .await
    }

    /// Every permission the user holds in the tenant, deduplicated.
    /// Empty for users without an active membership.
    pub async fn get_user_permissions(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> WardenResult<Vec<Permission>> {
        match self.resolve_permissions(tenant_id, user_id).await {
            Ok(permissions) => Ok(permissions),
            Err(e) if e.is_storage_fault() => Err(e),
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Member -> role -> policies -> permissions. Inactive members resolve
    /// to nothing; missing records surface as `NotFound`.
    async fn resolve_permissions(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> WardenResult<Vec<Permission>> {
        let member = self.members.get_by_tenant_and_user(tenant_id, user_id).await?;
        if !member.is_active() {
            return Ok(Vec::new());
        }

        let permissions = self.roles.get_effective_permissions(member.role_id).await?;
        if permissions.is_empty() {
            // Distinguish "role without policies" from "role deleted".
            self.roles.get_by_id(member.role_id).await?;
        }

        let mut seen = HashSet::new();
        Ok(permissions
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .collect())
    }
}
