//! SurrealDB implementation of [`SystemUserRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::system_user::{
    CreateSystemUser, ServiceType, SystemUser, UpdateSystemUser,
};
use warden_core::repository::SystemUserRepository;

use super::CountRow;
use crate::error::{DbError, parse_uuid};

fn parse_service_type(s: &str) -> Result<ServiceType, DbError> {
    match s {
        "worker" => Ok(ServiceType::Worker),
        "integration" => Ok(ServiceType::Integration),
        "cron" => Ok(ServiceType::Cron),
        "api" => Ok(ServiceType::Api),
        other => Err(DbError::Decode(format!("unknown service type: {other}"))),
    }
}

#[derive(Debug, SurrealValue)]
struct SystemUserRow {
    name: String,
    application_name: String,
    email: String,
    identity_id: String,
    description: String,
    service_type: String,
    is_active: bool,
    is_primary: bool,
    expires_at: Option<DateTime<Utc>>,
    created_by: String,
    metadata: serde_json::Value,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SystemUserRow {
    fn try_into_system_user(self, id: Uuid) -> Result<SystemUser, DbError> {
        Ok(SystemUser {
            id,
            name: self.name,
            application_name: self.application_name,
            email: self.email,
            identity_id: self.identity_id,
            description: self.description,
            service_type: parse_service_type(&self.service_type)?,
            is_active: self.is_active,
            is_primary: self.is_primary,
            expires_at: self.expires_at,
            created_by: self.created_by,
            metadata: self.metadata,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct SystemUserRowWithId {
    record_id: String,
    name: String,
    application_name: String,
    email: String,
    identity_id: String,
    description: String,
    service_type: String,
    is_active: bool,
    is_primary: bool,
    expires_at: Option<DateTime<Utc>>,
    created_by: String,
    metadata: serde_json::Value,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SystemUserRowWithId {
    fn try_into_system_user(self) -> Result<SystemUser, DbError> {
        let id = parse_uuid("system_user", &self.record_id)?;
        SystemUserRow {
            name: self.name,
            application_name: self.application_name,
            email: self.email,
            identity_id: self.identity_id,
            description: self.description,
            service_type: self.service_type,
            is_active: self.is_active,
            is_primary: self.is_primary,
            expires_at: self.expires_at,
            created_by: self.created_by,
            metadata: self.metadata,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .try_into_system_user(id)
    }
}

/// SurrealDB implementation of the SystemUser repository.
#[derive(Clone)]
pub struct SurrealSystemUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSystemUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find_one(
        &self,
        field: &'static str,
        value: &str,
    ) -> WardenResult<SystemUser> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM system_user \
             WHERE {field} = $value LIMIT 1"
        );

        let mut result = self
            .db
            .query(query)
            .bind(("value", value.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SystemUserRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("system_user", value))?;

        Ok(row.try_into_system_user()?)
    }

    /// Runs a single-record UPDATE and decodes the row it returns.
    async fn apply(&self, id: Uuid, assignments: &str) -> WardenResult<SystemUser> {
        let id_str = id.to_string();
        let query = format!(
            "UPDATE type::record('system_user', $id) SET {assignments}, \
             updated_at = time::now()"
        );

        let result = self
            .db
            .query(query)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("system_user", e))?;

        let rows: Vec<SystemUserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("system_user", id_str))?;

        Ok(row.try_into_system_user(id)?)
    }
}

impl<C: Connection> SystemUserRepository for SurrealSystemUserRepository<C> {
    async fn create(&self, input: CreateSystemUser) -> WardenResult<SystemUser> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let metadata = input
            .metadata
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('system_user', $id) SET \
                 name = $name, application_name = $application_name, \
                 email = $email, identity_id = $identity_id, \
                 description = $description, service_type = $service_type, \
                 is_active = true, is_primary = true, \
                 created_by = $created_by, metadata = $metadata",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("application_name", input.application_name))
            .bind(("email", input.email))
            .bind(("identity_id", input.identity_id))
            .bind(("description", input.description))
            .bind(("service_type", input.service_type.as_str()))
            .bind(("created_by", input.created_by))
            .bind(("metadata", metadata))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("system_user", e))?;

        let rows: Vec<SystemUserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("system_user", &id_str))?;

        Ok(row.try_into_system_user(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<SystemUser> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('system_user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SystemUserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("system_user", id_str))?;

        Ok(row.try_into_system_user(id)?)
    }

    async fn get_by_name(&self, name: &str) -> WardenResult<SystemUser> {
        self.find_one("name", name).await
    }

    async fn get_by_identity_id(&self, identity_id: &str) -> WardenResult<SystemUser> {
        self.find_one("identity_id", identity_id).await
    }

    async fn list(&self, active_only: bool) -> WardenResult<Vec<SystemUser>> {
        let query = if active_only {
            "SELECT meta::id(id) AS record_id, * FROM system_user \
             WHERE is_active = true ORDER BY created_at DESC"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM system_user \
             ORDER BY created_at DESC"
        };

        let mut result = self.db.query(query).await.map_err(DbError::from)?;

        let rows: Vec<SystemUserRowWithId> = result.take(0).map_err(DbError::from)?;
        let users = rows
            .into_iter()
            .map(SystemUserRowWithId::try_into_system_user)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(users)
    }

    async fn list_by_application(&self, application_name: &str) -> WardenResult<Vec<SystemUser>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM system_user \
                 WHERE application_name = $application_name \
                 ORDER BY is_primary DESC, created_at DESC",
            )
            .bind(("application_name", application_name.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SystemUserRowWithId> = result.take(0).map_err(DbError::from)?;
        let users = rows
            .into_iter()
            .map(SystemUserRowWithId::try_into_system_user)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(users)
    }

    async fn count_by_application(&self, application_name: &str) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM system_user \
                 WHERE application_name = $application_name GROUP ALL",
            )
            .bind(("application_name", application_name.to_owned()))
            .await
            .map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(count_rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn update(&self, id: Uuid, input: UpdateSystemUser) -> WardenResult<SystemUser> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        if input.metadata.is_some() {
            sets.push("metadata = $metadata");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('system_user', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }
        if let Some(metadata) = input.metadata {
            builder = builder.bind(("metadata", metadata));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("system_user", e))?;

        let rows: Vec<SystemUserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("system_user", id_str))?;

        Ok(row.try_into_system_user(id)?)
    }

    async fn demote(&self, id: Uuid, expires_at: DateTime<Utc>) -> WardenResult<SystemUser> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('system_user', $id) SET \
                 is_primary = false, expires_at = $expires_at, \
                 updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("expires_at", expires_at))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("system_user", e))?;

        let rows: Vec<SystemUserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("system_user", id_str))?;

        Ok(row.try_into_system_user(id)?)
    }

    async fn restore_primary(&self, id: Uuid) -> WardenResult<SystemUser> {
        self.apply(id, "is_primary = true, expires_at = NONE").await
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> WardenResult<SystemUser> {
        let assignment = if is_active {
            "is_active = true"
        } else {
            "is_active = false"
        };
        self.apply(id, assignment).await
    }

    async fn deactivate_expired(&self) -> WardenResult<u64> {
        let result = self
            .db
            .query(
                "UPDATE system_user SET is_active = false, \
                 updated_at = time::now() \
                 WHERE is_active = true AND expires_at != NONE \
                 AND expires_at < time::now()",
            )
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("system_user", e))?;

        let rows: Vec<SystemUserRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn touch_last_used(&self, identity_id: &str) -> WardenResult<()> {
        self.db
            .query(
                "UPDATE system_user SET last_used_at = time::now() \
                 WHERE identity_id = $identity_id",
            )
            .bind(("identity_id", identity_id.to_owned()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_statement("system_user", e))?;

        Ok(())
    }
}
