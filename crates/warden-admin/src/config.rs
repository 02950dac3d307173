//! Service-layer configuration.

use serde::Deserialize;

/// Configuration shared by the admin services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub invitation: InvitationConfig,
    pub system_users: SystemUserConfig,
    /// Identity-provider tenant that machine identities are created in.
    pub identity_tenant: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            invitation: InvitationConfig::default(),
            system_users: SystemUserConfig::default(),
            identity_tenant: "public".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    /// Invitation lifetime in hours (default: 72).
    pub expiry_hours: i64,
    /// Accept page; the token is appended as `?token=`.
    pub base_url: String,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            expiry_hours: 72,
            base_url: "http://localhost:3000/invitations/accept".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemUserConfig {
    /// Grace period applied when a rotation asks for zero or fewer days.
    pub default_grace_period_days: i64,
    /// Domain of the synthetic `<name>@<domain>` identity email.
    pub email_domain: String,
    pub password_prefix: String,
    /// Number of encoded characters kept after the prefix.
    pub password_length: usize,
}

impl Default for SystemUserConfig {
    fn default() -> Self {
        Self {
            default_grace_period_days: 7,
            email_domain: "system.internal".into(),
            password_prefix: "sysuser_".into(),
            password_length: 40,
        }
    }
}
