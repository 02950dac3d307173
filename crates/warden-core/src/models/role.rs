//! Role domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::Policy;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    /// Held by members inside a tenant.
    Tenant,
    /// Held by platform operators.
    Platform,
}

/// A named bundle of policies, scoped to a tenant or system-wide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub role_type: RoleType,
    pub description: String,
    pub tenant_id: Option<Uuid>,
    /// Derived from `tenant_id.is_none()`.
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Whether a policy with the given scope may be attached to this role.
    pub fn accepts_policy_scope(&self, policy_tenant: Option<Uuid>) -> bool {
        match policy_tenant {
            None => true,
            Some(t) => self.tenant_id == Some(t),
        }
    }
}

/// A role together with its attached policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDetail {
    pub role: Role,
    pub policies: Vec<Policy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub role_type: RoleType,
    pub description: String,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub role_type: Option<RoleType>,
    pub description: Option<String>,
}
