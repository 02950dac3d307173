//! SurrealDB implementation of [`RoleRepository`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::permission::Permission;
use warden_core::models::policy::Policy;
use warden_core::models::role::{CreateRole, Role, RoleType, UpdateRole};
use warden_core::repository::RoleRepository;

use super::CountRow;
use super::permission::PermissionRowWithId;
use super::policy::PolicyRowWithId;
use crate::error::{DbError, parse_opt_uuid, parse_uuid};

fn parse_role_type(s: &str) -> Result<RoleType, DbError> {
    match s {
        "tenant" => Ok(RoleType::Tenant),
        "platform" => Ok(RoleType::Platform),
        other => Err(DbError::Decode(format!("unknown role type: {other}"))),
    }
}

fn role_type_to_str(t: RoleType) -> &'static str {
    match t {
        RoleType::Tenant => "tenant",
        RoleType::Platform => "platform",
    }
}

#[derive(Debug, SurrealValue)]
struct RoleRow {
    name: String,
    role_type: String,
    description: String,
    tenant_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn try_into_role(self, id: Uuid) -> Result<Role, DbError> {
        let tenant_id = parse_opt_uuid("tenant", self.tenant_id.as_deref())?;
        Ok(Role {
            id,
            name: self.name,
            role_type: parse_role_type(&self.role_type)?,
            description: self.description,
            is_system: tenant_id.is_none(),
            tenant_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct RoleRowWithId {
    record_id: String,
    name: String,
    role_type: String,
    description: String,
    tenant_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRowWithId {
    fn try_into_role(self) -> Result<Role, DbError> {
        let id = parse_uuid("role", &self.record_id)?;
        RoleRow {
            name: self.name,
            role_type: self.role_type,
            description: self.description,
            tenant_id: self.tenant_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .try_into_role(id)
    }
}

/// SurrealDB implementation of the Role repository.
#[derive(Clone)]
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn create(&self, input: CreateRole) -> WardenResult<Role> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('role', $id) SET \
                 name = $name, role_type = $role_type, \
                 description = $description, tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("role_type", role_type_to_str(input.role_type)))
            .bind(("description", input.description))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("role", e))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("role", &id_str))?;

        Ok(row.try_into_role(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Role> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('role', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("role", id_str))?;

        Ok(row.try_into_role(id)?)
    }

    async fn get_by_name(&self, name: &str, scope: Option<Uuid>) -> WardenResult<Role> {
        // System roles and tenant roles are separate namespaces.
        let query = if scope.is_some() {
            "SELECT meta::id(id) AS record_id, * FROM role \
             WHERE name = $name AND tenant_id = $tenant_id LIMIT 1"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM role \
             WHERE name = $name AND tenant_id = NONE LIMIT 1"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("name", name.to_owned()))
            .bind(("tenant_id", scope.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("role", name))?;

        Ok(row.try_into_role()?)
    }

    async fn update(&self, id: Uuid, input: UpdateRole) -> WardenResult<Role> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.role_type.is_some() {
            sets.push("role_type = $role_type");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('role', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(role_type) = input.role_type {
            builder = builder.bind(("role_type", role_type_to_str(role_type)));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("role", e))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("role", id_str))?;

        Ok(row.try_into_role(id)?)
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        self.get_by_id(id).await?;

        self.db
            .query(
                "DELETE includes WHERE in = type::record('role', $id); \
                 DELETE type::record('role', $id);",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_statement("role", e))?;

        Ok(())
    }

    async fn list(&self, scope: Option<Uuid>) -> WardenResult<Vec<Role>> {
        let query = if scope.is_some() {
            "SELECT meta::id(id) AS record_id, * FROM role \
             WHERE tenant_id = $tenant_id OR tenant_id = NONE \
             ORDER BY name ASC"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM role \
             WHERE tenant_id = NONE ORDER BY name ASC"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("tenant_id", scope.map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let roles = rows
            .into_iter()
            .map(RoleRowWithId::try_into_role)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(roles)
    }

    async fn attach_policy(&self, role_id: Uuid, policy_id: Uuid) -> WardenResult<()> {
        let role_id_str = role_id.to_string();
        let policy_id_str = policy_id.to_string();

        let mut existing = self
            .db
            .query(
                "SELECT count() AS total FROM includes \
                 WHERE in = type::record('role', $role_id) \
                 AND out = type::record('policy', $policy_id) GROUP ALL",
            )
            .bind(("role_id", role_id_str.clone()))
            .bind(("policy_id", policy_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = existing.take(0).map_err(DbError::from)?;
        if count_rows.first().map(|r| r.total).unwrap_or(0) > 0 {
            return Ok(());
        }

        let query =
            format!("RELATE role:`{role_id_str}` -> includes -> policy:`{policy_id_str}`;");

        match self.db.query(query).await.map_err(DbError::from)?.check() {
            Ok(_) => Ok(()),
            Err(e) => match DbError::from_statement("role policy", e) {
                DbError::Duplicate { .. } => Ok(()),
                other => Err(other.into()),
            },
        }
    }

    async fn detach_policy(&self, role_id: Uuid, policy_id: Uuid) -> WardenResult<()> {
        self.db
            .query(
                "DELETE includes WHERE \
                 in = type::record('role', $role_id) AND \
                 out = type::record('policy', $policy_id)",
            )
            .bind(("role_id", role_id.to_string()))
            .bind(("policy_id", policy_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn get_policies(&self, role_id: Uuid) -> WardenResult<Vec<Policy>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM policy \
                 WHERE id IN (\
                     SELECT VALUE out FROM includes \
                     WHERE in = type::record('role', $role_id)\
                 ) \
                 ORDER BY name ASC",
            )
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PolicyRowWithId> = result.take(0).map_err(DbError::from)?;
        let policies = rows
            .into_iter()
            .map(PolicyRowWithId::try_into_policy)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(policies)
    }

    async fn get_effective_permissions(&self, role_id: Uuid) -> WardenResult<Vec<Permission>> {
        // Role -> includes -> policy -> grants -> permission.
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE id IN (\
                     SELECT VALUE out FROM grants \
                     WHERE in IN (\
                         SELECT VALUE out FROM includes \
                         WHERE in = type::record('role', $role_id)\
                     )\
                 ) \
                 ORDER BY service ASC, entity ASC, action ASC",
            )
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;

        // A permission reachable through several policies appears once.
        let mut seen = HashSet::new();
        let mut permissions = Vec::new();
        for row in rows {
            if seen.insert(row.record_id.clone()) {
                permissions.push(row.try_into_permission()?);
            }
        }

        Ok(permissions)
    }
}
