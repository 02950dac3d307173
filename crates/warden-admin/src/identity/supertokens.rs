//! SuperTokens core adapter over its HTTP API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use warden_core::identity::{IdentityError, IdentityProvider, IdentityResult};

const EMAIL_ALREADY_EXISTS: &str = "EMAIL_ALREADY_EXISTS_ERROR";
const UNKNOWN_USER_ID: &str = "UNKNOWN_USER_ID_ERROR";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuperTokensConfig {
    /// Base URL of the SuperTokens core, e.g. `http://localhost:3567`.
    pub connection_uri: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for SuperTokensConfig {
    fn default() -> Self {
        Self {
            connection_uri: "http://localhost:3567".into(),
            api_key: None,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoreUser {
    id: String,
}

/// Envelope of every SuperTokens core response.
#[derive(Debug, Deserialize)]
struct CoreResponse {
    status: String,
    user: Option<CoreUser>,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Identity provider backed by a SuperTokens core.
#[derive(Debug, Clone)]
pub struct SuperTokensIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

fn unavailable(err: reqwest::Error) -> IdentityError {
    IdentityError::Unavailable(err.to_string())
}

impl SuperTokensIdentityProvider {
    pub fn new(config: &SuperTokensConfig) -> IdentityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(unavailable)?;

        Ok(Self {
            client,
            base_url: config.connection_uri.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> IdentityResult<CoreResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        let parsed: CoreResponse = response.json().await.map_err(unavailable)?;

        debug!(path, status = %parsed.status, "SuperTokens call");
        Ok(parsed)
    }

    fn expect_ok(response: CoreResponse, identity_id: &str) -> IdentityResult<CoreResponse> {
        match response.status.as_str() {
            "OK" => Ok(response),
            EMAIL_ALREADY_EXISTS => Err(IdentityError::EmailAlreadyExists),
            UNKNOWN_USER_ID => Err(IdentityError::UnknownIdentity(identity_id.to_owned())),
            other => Err(IdentityError::Unavailable(format!(
                "unexpected status {other}"
            ))),
        }
    }
}

impl IdentityProvider for SuperTokensIdentityProvider {
    async fn sign_up(&self, tenant_scope: &str, email: &str, secret: &str) -> IdentityResult<String> {
        let path = format!("/{tenant_scope}/recipe/signup");
        let response = self
            .call(
                reqwest::Method::POST,
                &path,
                &SignUpRequest {
                    email,
                    password: secret,
                },
            )
            .await?;

        Self::expect_ok(response, "")?
            .user
            .map(|u| u.id)
            .ok_or_else(|| IdentityError::Unavailable("sign-up response without user".into()))
    }

    async fn update_secret(&self, identity_id: &str, secret: &str) -> IdentityResult<()> {
        let response = self
            .call(
                reqwest::Method::PUT,
                "/recipe/user",
                &json!({ "recipeUserId": identity_id, "password": secret }),
            )
            .await?;
        Self::expect_ok(response, identity_id).map(|_| ())
    }

    async fn revoke_all_sessions(&self, identity_id: &str) -> IdentityResult<()> {
        let response = self
            .call(
                reqwest::Method::POST,
                "/recipe/session/remove",
                &json!({ "userId": identity_id }),
            )
            .await?;
        Self::expect_ok(response, identity_id).map(|_| ())
    }

    async fn set_metadata(&self, identity_id: &str, metadata: serde_json::Value) -> IdentityResult<()> {
        let response = self
            .call(
                reqwest::Method::PUT,
                "/recipe/user/metadata",
                &json!({ "userId": identity_id, "metadataUpdate": metadata }),
            )
            .await?;
        Self::expect_ok(response, identity_id).map(|_| ())
    }

    async fn delete_identity(&self, identity_id: &str) -> IdentityResult<()> {
        let response = self
            .call(
                reqwest::Method::POST,
                "/user/remove",
                &json!({ "userId": identity_id }),
            )
            .await?;
        Self::expect_ok(response, identity_id).map(|_| ())
    }
}
