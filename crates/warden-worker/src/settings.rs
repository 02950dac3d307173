//! Layered worker configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! TOML file, then `WARDEN__`-prefixed environment variables using `__`
//! as the nesting separator (e.g. `WARDEN__WORKER__CONCURRENCY=20`).

use serde::Deserialize;
use warden_admin::config::{InvitationConfig, SystemUserConfig};
use warden_admin::identity::SuperTokensConfig;
use warden_db::DbConfig;
use warden_jobs::config::{EmailConfig, TenantInitConfig, WorkerConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DbConfig,
    pub redis: RedisSettings,
    pub identity: IdentitySettings,
    pub worker: WorkerConfig,
    pub invitation: InvitationConfig,
    pub system_users: SystemUserConfig,
    pub tenant_init: TenantInitConfig,
    pub email: EmailConfig,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityBackend {
    /// Process-local identities, lost on restart.
    #[default]
    Memory,
    SuperTokens,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub provider: IdentityBackend,
    pub supertokens: SuperTokensConfig,
    /// Identity-provider tenant that system users are created in.
    pub tenant: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            provider: IdentityBackend::default(),
            supertokens: SuperTokensConfig::default(),
            tenant: "public".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warden=info".into(),
            format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Load from `path` (or `warden.toml` in the working directory, if
    /// present) and the environment.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::with_name(path),
            None => config::File::with_name("warden").required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("WARDEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
