//! Warden admin services: RBAC, system-user credentials, invitations,
//! tenants, members and platform admins.
//!
//! Every service is generic over the repository traits in `warden-core`
//! and over the [`IdentityProvider`](warden_core::identity::IdentityProvider)
//! and [`JobDispatcher`](warden_core::dispatch::JobDispatcher)
//! collaborators, so it can run against SurrealDB in production and
//! against in-memory doubles in tests.

pub mod config;
pub mod error;
pub mod identity;
pub mod invitation;
pub mod member;
pub mod platform_admin;
pub mod rbac;
pub mod secret;
pub mod system_user;
pub mod tenant;

pub use config::{AdminConfig, InvitationConfig, SystemUserConfig};
pub use error::AdminError;
pub use identity::{InMemoryIdentityProvider, SuperTokensConfig, SuperTokensIdentityProvider};
pub use invitation::{InvitationService, NewInvitation};
pub use member::MemberService;
pub use platform_admin::PlatformAdminService;
pub use rbac::{ADMIN_ROLE, MEMBER_ROLE, RbacService};
pub use secret::OneTimeSecret;
pub use system_user::{IssuedCredential, NewSystemUser, OldCredential, SystemUserService};
pub use tenant::{NewTenant, TenantService, normalize_slug};
