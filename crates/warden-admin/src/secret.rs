//! Secret generation for machine credentials and invitation tokens.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::config::SystemUserConfig;

/// A plaintext secret that is handed to the caller exactly once.
///
/// It is never stored by Warden and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct OneTimeSecret(String);

impl OneTimeSecret {
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for OneTimeSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OneTimeSecret(<redacted>)")
    }
}

/// Generate a machine-credential password: the configured prefix
/// followed by URL-safe base64 of 32 random bytes, truncated.
pub fn generate_password(config: &SystemUserConfig) -> OneTimeSecret {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    let keep = config.password_length.min(encoded.len());
    OneTimeSecret(format!("{}{}", config.password_prefix, &encoded[..keep]))
}

/// Generate an invitation token (32 random bytes, hex-encoded).
pub fn generate_invitation_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    hex::encode(bytes)
}

/// SHA-256 of a secret, hex-encoded.
pub fn digest(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_has_prefix_and_fixed_length() {
        let config = SystemUserConfig::default();
        let password = generate_password(&config);
        let body = password
            .expose()
            .strip_prefix("sysuser_")
            .expect("prefix present");
        assert_eq!(body.len(), 40);
        assert!(
            body.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn passwords_are_unique() {
        let config = SystemUserConfig::default();
        assert_ne!(generate_password(&config), generate_password(&config));
    }

    #[test]
    fn debug_never_reveals_secret() {
        let secret = OneTimeSecret::new("sysuser_abc".into());
        assert!(!format!("{secret:?}").contains("abc"));
    }

    #[test]
    fn invitation_token_is_64_hex_chars() {
        let token = generate_invitation_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest("abc"), digest("abc"));
        assert_ne!(digest("abc"), digest("abd"));
        assert_eq!(digest("abc").len(), 64);
    }
}
