//! SurrealDB implementation of [`PermissionRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::permission::{CreatePermission, Permission};
use warden_core::repository::PermissionRepository;

use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
struct PermissionRow {
    service: String,
    entity: String,
    action: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PermissionRow {
    fn into_permission(self, id: Uuid) -> Permission {
        Permission {
            id,
            service: self.service,
            entity: self.entity,
            action: self.action,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, SurrealValue)]
pub(crate) struct PermissionRowWithId {
    pub(crate) record_id: String,
    service: String,
    entity: String,
    action: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PermissionRowWithId {
    pub(crate) fn try_into_permission(self) -> Result<Permission, DbError> {
        Ok(Permission {
            id: parse_uuid("permission", &self.record_id)?,
            service: self.service,
            entity: self.entity,
            action: self.action,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn collect_permissions(
    rows: Vec<PermissionRowWithId>,
) -> Result<Vec<Permission>, DbError> {
    rows.into_iter()
        .map(PermissionRowWithId::try_into_permission)
        .collect()
}

/// SurrealDB implementation of the Permission repository.
#[derive(Clone)]
pub struct SurrealPermissionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPermissionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PermissionRepository for SurrealPermissionRepository<C> {
    async fn create(&self, input: CreatePermission) -> WardenResult<Permission> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('permission', $id) SET \
                 service = $service, entity = $entity, \
                 action = $action, description = $description",
            )
            .bind(("id", id_str.clone()))
            .bind(("service", input.service))
            .bind(("entity", input.entity))
            .bind(("action", input.action))
            .bind(("description", input.description))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("permission", e))?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("permission", &id_str))?;

        Ok(row.into_permission(id))
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Permission> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('permission', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("permission", id_str))?;

        Ok(row.try_into_permission()?)
    }

    async fn get_by_triple(
        &self,
        service: &str,
        entity: &str,
        action: &str,
    ) -> WardenResult<Permission> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE service = $service AND entity = $entity \
                 AND action = $action LIMIT 1",
            )
            .bind(("service", service.to_owned()))
            .bind(("entity", entity.to_owned()))
            .bind(("action", action.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("permission", format!("{service}:{entity}:{action}")))?;

        Ok(row.try_into_permission()?)
    }

    async fn list_all(&self) -> WardenResult<Vec<Permission>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 ORDER BY service ASC, entity ASC, action ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect_permissions(rows)?)
    }

    async fn list_by_service(&self, service: &str) -> WardenResult<Vec<Permission>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE service = $service \
                 ORDER BY entity ASC, action ASC",
            )
            .bind(("service", service.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect_permissions(rows)?)
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        // Existence check first so a missing id is reported, not ignored.
        self.get_by_id(id).await?;

        self.db
            .query(
                "DELETE grants WHERE out = type::record('permission', $id); \
                 DELETE type::record('permission', $id);",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_statement("permission", e))?;

        Ok(())
    }
}
