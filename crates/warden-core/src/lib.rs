//! Warden Core — shared domain models, error types, repository
//! contracts and the collaborator traits the service layer depends on.

pub mod dispatch;
pub mod error;
pub mod identity;
pub mod models;
pub mod repository;

pub use error::{WardenError, WardenResult};
