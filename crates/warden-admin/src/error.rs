//! Service-level refusals.

use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid slug: {0:?}")]
    InvalidSlug(String),

    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("invalid permission key: {0:?}")]
    InvalidPermissionKey(String),

    #[error("invitation is {0}")]
    InvitationNotPending(&'static str),

    #[error("invitation has expired")]
    InvitationExpired,

    #[error("user is already a member of this tenant")]
    AlreadyMember,

    #[error("user is already a platform admin")]
    AlreadyPlatformAdmin,

    #[error("role is held by {0} member(s)")]
    RoleInUse(u64),

    #[error("policy belongs to a different tenant than the role")]
    PolicyScopeMismatch,

    #[error("role belongs to a different tenant")]
    RoleScopeMismatch,

    #[error("system role {0:?} is missing; run RBAC bootstrap first")]
    MissingSystemRole(String),

    #[error("grace period of {0} days is out of range")]
    GracePeriodTooLong(i64),

    #[error("credential is inactive")]
    CredentialInactive,

    #[error("only the primary credential of an application can be rotated")]
    NotPrimary,
}

impl From<AdminError> for WardenError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::InvalidName(_)
            | AdminError::InvalidSlug(_)
            | AdminError::InvalidEmail(_)
            | AdminError::InvalidPermissionKey(_)
            | AdminError::PolicyScopeMismatch
            | AdminError::RoleScopeMismatch
            | AdminError::GracePeriodTooLong(_) => WardenError::Validation {
                message: err.to_string(),
            },
            AdminError::AlreadyMember
            | AdminError::AlreadyPlatformAdmin
            | AdminError::RoleInUse(_) => WardenError::Conflict {
                reason: err.to_string(),
            },
            AdminError::InvitationNotPending(_)
            | AdminError::InvitationExpired
            | AdminError::MissingSystemRole(_)
            | AdminError::CredentialInactive
            | AdminError::NotPrimary => WardenError::InvalidState {
                reason: err.to_string(),
            },
        }
    }
}
