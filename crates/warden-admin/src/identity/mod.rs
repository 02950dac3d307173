//! Identity provider adapters.

mod memory;
mod supertokens;

pub use memory::InMemoryIdentityProvider;
pub use supertokens::{SuperTokensConfig, SuperTokensIdentityProvider};
