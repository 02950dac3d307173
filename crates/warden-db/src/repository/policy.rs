//! SurrealDB implementation of [`PolicyRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::permission::Permission;
use warden_core::models::policy::{CreatePolicy, Policy, UpdatePolicy};
use warden_core::repository::PolicyRepository;

use super::CountRow;
use super::permission::{PermissionRowWithId, collect_permissions};
use crate::error::{DbError, parse_opt_uuid, parse_uuid};

#[derive(Debug, SurrealValue)]
struct PolicyRow {
    name: String,
    description: String,
    tenant_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PolicyRow {
    fn try_into_policy(self, id: Uuid) -> Result<Policy, DbError> {
        let tenant_id = parse_opt_uuid("tenant", self.tenant_id.as_deref())?;
        Ok(Policy {
            id,
            name: self.name,
            description: self.description,
            is_system: tenant_id.is_none(),
            tenant_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
pub(crate) struct PolicyRowWithId {
    record_id: String,
    name: String,
    description: String,
    tenant_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PolicyRowWithId {
    pub(crate) fn try_into_policy(self) -> Result<Policy, DbError> {
        let id = parse_uuid("policy", &self.record_id)?;
        PolicyRow {
            name: self.name,
            description: self.description,
            tenant_id: self.tenant_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .try_into_policy(id)
    }
}

/// SurrealDB implementation of the Policy repository.
#[derive(Clone)]
pub struct SurrealPolicyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPolicyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PolicyRepository for SurrealPolicyRepository<C> {
    async fn create(&self, input: CreatePolicy) -> WardenResult<Policy> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('policy', $id) SET \
                 name = $name, description = $description, \
                 tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("policy", e))?;

        let rows: Vec<PolicyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("policy", &id_str))?;

        Ok(row.try_into_policy(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Policy> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('policy', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PolicyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("policy", id_str))?;

        Ok(row.try_into_policy(id)?)
    }

    async fn get_by_name(&self, name: &str, scope: Option<Uuid>) -> WardenResult<Policy> {
        let query = if scope.is_some() {
            "SELECT meta::id(id) AS record_id, * FROM policy \
             WHERE name = $name AND tenant_id = $tenant_id LIMIT 1"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM policy \
             WHERE name = $name AND tenant_id = NONE LIMIT 1"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("name", name.to_owned()))
            .bind(("tenant_id", scope.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PolicyRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("policy", name))?;

        Ok(row.try_into_policy()?)
    }

    async fn update(&self, id: Uuid, input: UpdatePolicy) -> WardenResult<Policy> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('policy', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("policy", e))?;

        let rows: Vec<PolicyRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("policy", id_str))?;

        Ok(row.try_into_policy(id)?)
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        self.get_by_id(id).await?;

        // Unlink from permissions and roles, then drop the record.
        self.db
            .query(
                "DELETE grants WHERE in = type::record('policy', $id); \
                 DELETE includes WHERE out = type::record('policy', $id); \
                 DELETE type::record('policy', $id);",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_statement("policy", e))?;

        Ok(())
    }

    async fn list(&self, scope: Option<Uuid>) -> WardenResult<Vec<Policy>> {
        let query = if scope.is_some() {
            "SELECT meta::id(id) AS record_id, * FROM policy \
             WHERE tenant_id = $tenant_id OR tenant_id = NONE \
             ORDER BY name ASC"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM policy \
             WHERE tenant_id = NONE ORDER BY name ASC"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("tenant_id", scope.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PolicyRowWithId> = result.take(0).map_err(DbError::from)?;
        let policies = rows
            .into_iter()
            .map(PolicyRowWithId::try_into_policy)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(policies)
    }

    async fn attach_permission(&self, policy_id: Uuid, permission_id: Uuid) -> WardenResult<()> {
        let policy_id_str = policy_id.to_string();
        let perm_id_str = permission_id.to_string();

        let mut existing = self
            .db
            .query(
                "SELECT count() AS total FROM grants \
                 WHERE in = type::record('policy', $policy_id) \
                 AND out = type::record('permission', $perm_id) GROUP ALL",
            )
            .bind(("policy_id", policy_id_str.clone()))
            .bind(("perm_id", perm_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = existing.take(0).map_err(DbError::from)?;
        if count_rows.first().map(|r| r.total).unwrap_or(0) > 0 {
            return Ok(());
        }

        let query =
            format!("RELATE policy:`{policy_id_str}` -> grants -> permission:`{perm_id_str}`;");

        match self.db.query(query).await.map_err(DbError::from)?.check() {
            Ok(_) => Ok(()),
            Err(e) => match DbError::from_statement("grant", e) {
                // Lost a race with a concurrent attach; the link exists.
                DbError::Duplicate { .. } => Ok(()),
                other => Err(other.into()),
            },
        }
    }

    async fn detach_permission(&self, policy_id: Uuid, permission_id: Uuid) -> WardenResult<()> {
        self.db
            .query(
                "DELETE grants WHERE \
                 in = type::record('policy', $policy_id) AND \
                 out = type::record('permission', $perm_id)",
            )
            .bind(("policy_id", policy_id.to_string()))
            .bind(("perm_id", permission_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn get_permissions(&self, policy_id: Uuid) -> WardenResult<Vec<Permission>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE id IN (\
                     SELECT VALUE out FROM grants \
                     WHERE in = type::record('policy', $policy_id)\
                 ) \
                 ORDER BY service ASC, entity ASC, action ASC",
            )
            .bind(("policy_id", policy_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect_permissions(rows)?)
    }
}
