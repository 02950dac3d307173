//! SurrealDB connection management.

use std::time::Duration;

use serde::Deserialize;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::{info, warn};

use crate::error::DbError;
use crate::schema::run_migrations;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// WebSocket endpoint, e.g. `127.0.0.1:8000`.
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Root credentials.
    pub username: String,
    pub password: String,
    /// Apply pending schema migrations right after connecting.
    pub migrate_on_connect: bool,
    /// Connection attempts before giving up (at least one).
    pub connect_attempts: u32,
    /// Pause between failed connection attempts.
    pub retry_delay_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "warden".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
            migrate_on_connect: true,
            connect_attempts: 5,
            retry_delay_ms: 2_000,
        }
    }
}

/// Shared handle onto a remote SurrealDB. Cloning is cheap; every
/// repository takes its own clone of [`DbManager::client`].
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, sign in as root and select the namespace and database,
    /// retrying while the server is not reachable yet. Migrations run
    /// once the session is established when `migrate_on_connect` is set.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let attempts = config.connect_attempts.max(1);
        let mut attempt = 1;
        let db = loop {
            match Self::open(config).await {
                Ok(db) => break db,
                Err(e) if attempt < attempts => {
                    warn!(
                        url = %config.url,
                        attempt,
                        attempts,
                        error = %e,
                        "SurrealDB not reachable, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        if config.migrate_on_connect {
            run_migrations(&db).await?;
        }

        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connected to SurrealDB"
        );
        Ok(Self { db })
    }

    async fn open(config: &DbConfig) -> Result<Surreal<Client>, DbError> {
        let db = Surreal::new::<Ws>(&config.url).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;
        Ok(db)
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }
}
