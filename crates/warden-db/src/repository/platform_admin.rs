//! SurrealDB implementation of [`PlatformAdminRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::platform_admin::{CreatePlatformAdmin, PlatformAdmin};
use warden_core::repository::PlatformAdminRepository;

use crate::error::{DbError, parse_uuid};

/// Row returned by `CREATE`, where the id is already known.
#[derive(Debug, SurrealValue)]
struct PlatformAdminRow {
    user_id: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlatformAdminRow {
    fn into_admin(self, id: Uuid) -> PlatformAdmin {
        PlatformAdmin {
            id,
            user_id: self.user_id,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct PlatformAdminRowWithId {
    record_id: String,
    user_id: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlatformAdminRowWithId {
    fn try_into_admin(self) -> Result<PlatformAdmin, DbError> {
        let id = parse_uuid("platform_admin", &self.record_id)?;
        Ok(PlatformAdminRow {
            user_id: self.user_id,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_admin(id))
    }
}

#[derive(Clone)]
pub struct SurrealPlatformAdminRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPlatformAdminRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PlatformAdminRepository for SurrealPlatformAdminRepository<C> {
    async fn create(&self, input: CreatePlatformAdmin) -> WardenResult<PlatformAdmin> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "CREATE type::record('platform_admin', $id) SET \
                 user_id = $user_id, created_by = $created_by",
            )
            .bind(("id", id.to_string()))
            .bind(("user_id", input.user_id))
            .bind(("created_by", input.created_by))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("platform_admin", e))?;

        let rows: Vec<PlatformAdminRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("platform_admin", id))?;

        Ok(row.into_admin(id))
    }

    async fn get_by_user(&self, user_id: &str) -> WardenResult<PlatformAdmin> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM platform_admin \
                 WHERE user_id = $user_id LIMIT 1",
            )
            .bind(("user_id", user_id.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PlatformAdminRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("platform_admin", user_id))?;

        Ok(row.try_into_admin()?)
    }

    async fn list(&self) -> WardenResult<Vec<PlatformAdmin>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM platform_admin \
                 ORDER BY created_at DESC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PlatformAdminRowWithId> = result.take(0).map_err(DbError::from)?;
        let admins = rows
            .into_iter()
            .map(PlatformAdminRowWithId::try_into_admin)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(admins)
    }

    async fn delete(&self, user_id: &str) -> WardenResult<()> {
        let admin = self.get_by_user(user_id).await?;

        self.db
            .query("DELETE type::record('platform_admin', $id)")
            .bind(("id", admin.id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn exists(&self, user_id: &str) -> WardenResult<bool> {
        match self.get_by_user(user_id).await {
            Ok(_) => Ok(true),
            Err(WardenError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
