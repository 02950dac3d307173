//! Domain models for Warden.
//!
//! These are the core types shared across all crates.

pub mod invitation;
pub mod member;
pub mod permission;
pub mod platform_admin;
pub mod policy;
pub mod role;
pub mod system_user;
pub mod tenant;
