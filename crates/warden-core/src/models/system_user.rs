//! System user (machine credential) domain model.
//!
//! Each row is one credential version. Versions of the same logical
//! application share `application_name`; at steady state exactly one of
//! them is primary and non-expiring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Worker,
    Integration,
    Cron,
    Api,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Worker => "worker",
            ServiceType::Integration => "integration",
            ServiceType::Cron => "cron",
            ServiceType::Api => "api",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemUser {
    pub id: Uuid,
    /// Unique, versioned after rotation (`app`, `app-v2`, ...).
    pub name: String,
    pub application_name: String,
    /// Synthetic email derived from `name`.
    pub email: String,
    /// Identity-provider user id.
    pub identity_id: String,
    pub description: String,
    pub service_type: ServiceType,
    pub is_active: bool,
    pub is_primary: bool,
    /// `None` means the credential does not expire.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub metadata: serde_json::Value,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SystemUser {
    /// Active, non-primary and not yet past its expiry.
    pub fn in_grace_period_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_primary && self.expires_at.is_some_and(|at| now < at)
    }

    /// Whether this credential should still authenticate at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSystemUser {
    pub name: String,
    pub application_name: String,
    pub email: String,
    pub identity_id: String,
    pub description: String,
    pub service_type: ServiceType,
    pub created_by: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateSystemUser {
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}
