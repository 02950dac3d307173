//! Tenant membership domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
    Pending,
}

/// Links an identity-provider user to a tenant with one role.
///
/// At most one membership exists per (tenant, user).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantMember {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: String,
    pub role_id: Uuid,
    pub status: MemberStatus,
    pub invited_by: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantMember {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantMember {
    pub tenant_id: Uuid,
    pub user_id: String,
    pub role_id: Uuid,
    pub status: MemberStatus,
    pub invited_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenantMember {
    pub role_id: Option<Uuid>,
    pub status: Option<MemberStatus>,
    pub invited_by: Option<String>,
}
