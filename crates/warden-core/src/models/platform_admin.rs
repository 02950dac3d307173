//! Platform administrators: users allowed to operate across every tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformAdmin {
    pub id: Uuid,
    /// Identity-provider user id. At most one entry per user.
    pub user_id: String,
    /// User id of the admin who granted the status.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlatformAdmin {
    pub user_id: String,
    pub created_by: String,
}
