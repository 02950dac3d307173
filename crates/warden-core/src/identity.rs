//! Identity provider capability contract.
//!
//! The identity provider is the second system of record for machine
//! credentials: it owns the secret and the sessions, while Warden owns
//! the credential lifecycle. Implementations live outside this crate.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("an identity with this email already exists")]
    EmailAlreadyExists,

    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

pub trait IdentityProvider: Send + Sync {
    /// Create an email/password identity and return its provider-side id.
    fn sign_up(
        &self,
        tenant_scope: &str,
        email: &str,
        secret: &str,
    ) -> impl Future<Output = IdentityResult<String>> + Send;

    fn update_secret(
        &self,
        identity_id: &str,
        secret: &str,
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    fn revoke_all_sessions(
        &self,
        identity_id: &str,
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    /// Merge `metadata` into the identity's metadata document.
    fn set_metadata(
        &self,
        identity_id: &str,
        metadata: serde_json::Value,
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    /// Remove an identity. Used only to compensate a half-finished issue.
    fn delete_identity(&self, identity_id: &str)
    -> impl Future<Output = IdentityResult<()>> + Send;
}
