//! SurrealDB repository implementations.

use surrealdb_types::SurrealValue;

mod invitation;
mod member;
mod permission;
mod platform_admin;
mod policy;
mod role;
mod system_user;
mod tenant;

pub use invitation::SurrealInvitationRepository;
pub use member::SurrealTenantMemberRepository;
pub use permission::SurrealPermissionRepository;
pub use platform_admin::SurrealPlatformAdminRepository;
pub use policy::SurrealPolicyRepository;
pub use role::SurrealRoleRepository;
pub use system_user::SurrealSystemUserRepository;
pub use tenant::SurrealTenantRepository;

/// Result row of `SELECT count() AS total ... GROUP ALL`.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}
