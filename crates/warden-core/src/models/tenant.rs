//! Tenant domain model.
//!
//! A tenant owns its memberships and invitations. Tenants are created
//! `Pending`, become `Active` once initialisation completes and are
//! soft-deleted by moving to `Deleted`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Pending,
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Globally unique, lowercase and hyphenated (e.g., `acme-co`).
    pub slug: String,
    pub status: TenantStatus,
    /// Arbitrary key-value metadata.
    pub metadata: serde_json::Value,
    /// Identity-provider user id of the creator.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
    pub status: TenantStatus,
    pub metadata: Option<serde_json::Value>,
    pub created_by: String,
}

/// Fields that can be updated on an existing tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub status: Option<TenantStatus>,
    pub metadata: Option<serde_json::Value>,
}
