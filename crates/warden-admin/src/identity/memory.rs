//! In-process identity provider for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;
use warden_core::identity::{IdentityError, IdentityProvider, IdentityResult};

use crate::secret::digest;

#[derive(Debug)]
struct Identity {
    tenant: String,
    email: String,
    secret_digest: String,
    metadata: serde_json::Value,
    sessions: usize,
}

#[derive(Debug, Default)]
struct State {
    identities: HashMap<String, Identity>,
    next_sign_up_error: Option<IdentityError>,
    fail_revocations: bool,
}

/// Identities held in memory; secrets are kept only as SHA-256 digests.
///
/// Cloning yields another handle onto the same store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvider {
    state: Arc<Mutex<State>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `sign_up` call fail with `error`.
    pub async fn fail_next_sign_up(&self, error: IdentityError) {
        self.state.lock().await.next_sign_up_error = Some(error);
    }

    /// Make every `revoke_all_sessions` call fail while set.
    pub async fn fail_revocations(&self, fail: bool) {
        self.state.lock().await.fail_revocations = fail;
    }

    /// Check a secret and open a session. Returns the identity id.
    pub async fn authenticate(&self, email: &str, secret: &str) -> Option<String> {
        let expected = digest(secret);
        let mut state = self.state.lock().await;
        let (id, identity) = state
            .identities
            .iter_mut()
            .find(|(_, identity)| identity.email == email)?;
        if identity.secret_digest != expected {
            return None;
        }
        identity.sessions += 1;
        Some(id.clone())
    }

    pub async fn active_sessions(&self, identity_id: &str) -> usize {
        self.state
            .lock()
            .await
            .identities
            .get(identity_id)
            .map_or(0, |i| i.sessions)
    }

    pub async fn metadata(&self, identity_id: &str) -> Option<serde_json::Value> {
        self.state
            .lock()
            .await
            .identities
            .get(identity_id)
            .map(|i| i.metadata.clone())
    }

    pub async fn contains_email(&self, email: &str) -> bool {
        self.state
            .lock()
            .await
            .identities
            .values()
            .any(|i| i.email == email)
    }

    pub async fn identity_count(&self) -> usize {
        self.state.lock().await.identities.len()
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(&self, tenant_scope: &str, email: &str, secret: &str) -> IdentityResult<String> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.next_sign_up_error.take() {
            return Err(error);
        }
        if state
            .identities
            .values()
            .any(|i| i.tenant == tenant_scope && i.email == email)
        {
            return Err(IdentityError::EmailAlreadyExists);
        }

        let id = Uuid::new_v4().to_string();
        state.identities.insert(
            id.clone(),
            Identity {
                tenant: tenant_scope.to_owned(),
                email: email.to_owned(),
                secret_digest: digest(secret),
                metadata: serde_json::Value::Object(Default::default()),
                sessions: 0,
            },
        );
        Ok(id)
    }

    async fn update_secret(&self, identity_id: &str, secret: &str) -> IdentityResult<()> {
        let mut state = self.state.lock().await;
        let identity = state
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| IdentityError::UnknownIdentity(identity_id.to_owned()))?;
        identity.secret_digest = digest(secret);
        Ok(())
    }

    async fn revoke_all_sessions(&self, identity_id: &str) -> IdentityResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_revocations {
            return Err(IdentityError::Unavailable("session store offline".into()));
        }
        let identity = state
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| IdentityError::UnknownIdentity(identity_id.to_owned()))?;
        identity.sessions = 0;
        Ok(())
    }

    async fn set_metadata(&self, identity_id: &str, metadata: serde_json::Value) -> IdentityResult<()> {
        let mut state = self.state.lock().await;
        let identity = state
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| IdentityError::UnknownIdentity(identity_id.to_owned()))?;

        match (&mut identity.metadata, metadata) {
            (serde_json::Value::Object(current), serde_json::Value::Object(update)) => {
                current.extend(update);
            }
            (current, other) => *current = other,
        }
        Ok(())
    }

    async fn delete_identity(&self, identity_id: &str) -> IdentityResult<()> {
        self.state
            .lock()
            .await
            .identities
            .remove(identity_id)
            .map(|_| ())
            .ok_or_else(|| IdentityError::UnknownIdentity(identity_id.to_owned()))
    }
}
