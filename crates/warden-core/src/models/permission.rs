//! Permission domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An atomic capability, identified by its (service, entity, action) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Permission {
    pub id: Uuid,
    /// Owning service (e.g., `billing`).
    pub service: String,
    /// Entity within the service (e.g., `invoice`).
    pub entity: String,
    /// The action this permission represents (e.g., `read`, `approve`).
    pub action: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Canonical `service:entity:action` form.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.service, self.entity, self.action)
    }

    /// Exact triple match. No wildcards.
    pub fn matches(&self, service: &str, entity: &str, action: &str) -> bool {
        self.service == service && self.entity == entity && self.action == action
    }
}

/// Split a `service:entity:action` key into its parts.
pub fn parse_permission_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.split(':');
    let service = parts.next()?;
    let entity = parts.next()?;
    let action = parts.next()?;
    if parts.next().is_some() || service.is_empty() || entity.is_empty() || action.is_empty() {
        return None;
    }
    Some((service, entity, action))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermission {
    pub service: String,
    pub entity: String,
    pub action: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_part_keys_only() {
        assert_eq!(
            parse_permission_key("billing:invoice:read"),
            Some(("billing", "invoice", "read"))
        );
        assert_eq!(parse_permission_key("billing:invoice"), None);
        assert_eq!(parse_permission_key("a:b:c:d"), None);
        assert_eq!(parse_permission_key("billing::read"), None);
    }
}
