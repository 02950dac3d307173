//! SurrealDB implementation of [`TenantMemberRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::member::{
    CreateTenantMember, MemberStatus, TenantMember, UpdateTenantMember,
};
use warden_core::repository::{PaginatedResult, Pagination, TenantMemberRepository};

use super::CountRow;
use crate::error::{DbError, parse_uuid};

fn parse_status(s: &str) -> Result<MemberStatus, DbError> {
    match s {
        "active" => Ok(MemberStatus::Active),
        "inactive" => Ok(MemberStatus::Inactive),
        "pending" => Ok(MemberStatus::Pending),
        other => Err(DbError::Decode(format!("unknown member status: {other}"))),
    }
}

fn status_to_str(s: MemberStatus) -> &'static str {
    match s {
        MemberStatus::Active => "active",
        MemberStatus::Inactive => "inactive",
        MemberStatus::Pending => "pending",
    }
}

#[derive(Debug, SurrealValue)]
struct MemberRow {
    tenant_id: String,
    user_id: String,
    role_id: String,
    status: String,
    invited_by: Option<String>,
    joined_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MemberRow {
    fn try_into_member(self, id: Uuid) -> Result<TenantMember, DbError> {
        Ok(TenantMember {
            id,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            user_id: self.user_id,
            role_id: parse_uuid("role", &self.role_id)?,
            status: parse_status(&self.status)?,
            invited_by: self.invited_by,
            joined_at: self.joined_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct MemberRowWithId {
    record_id: String,
    tenant_id: String,
    user_id: String,
    role_id: String,
    status: String,
    invited_by: Option<String>,
    joined_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MemberRowWithId {
    fn try_into_member(self) -> Result<TenantMember, DbError> {
        let id = parse_uuid("tenant_member", &self.record_id)?;
        MemberRow {
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            role_id: self.role_id,
            status: self.status,
            invited_by: self.invited_by,
            joined_at: self.joined_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .try_into_member(id)
    }
}

/// SurrealDB implementation of the TenantMember repository.
#[derive(Clone)]
pub struct SurrealTenantMemberRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantMemberRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> TenantMemberRepository for SurrealTenantMemberRepository<C> {
    async fn create(&self, input: CreateTenantMember) -> WardenResult<TenantMember> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('tenant_member', $id) SET \
                 tenant_id = $tenant_id, user_id = $user_id, \
                 role_id = $role_id, status = $status, \
                 invited_by = $invited_by, joined_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("user_id", input.user_id))
            .bind(("role_id", input.role_id.to_string()))
            .bind(("status", status_to_str(input.status)))
            .bind(("invited_by", input.invited_by))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("tenant_member", e))?;

        let rows: Vec<MemberRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("tenant_member", &id_str))?;

        Ok(row.try_into_member(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<TenantMember> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('tenant_member', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MemberRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("tenant_member", id_str))?;

        Ok(row.try_into_member(id)?)
    }

    async fn get_by_tenant_and_user(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> WardenResult<TenantMember> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM tenant_member \
                 WHERE tenant_id = $tenant_id AND user_id = $user_id LIMIT 1",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("user_id", user_id.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MemberRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("tenant_member", format!("{tenant_id}/{user_id}")))?;

        Ok(row.try_into_member()?)
    }

    async fn update(&self, id: Uuid, input: UpdateTenantMember) -> WardenResult<TenantMember> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.role_id.is_some() {
            sets.push("role_id = $role_id");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        if input.invited_by.is_some() {
            sets.push("invited_by = $invited_by");
        }
        // Re-activation counts as joining again.
        if input.status == Some(MemberStatus::Active) {
            sets.push("joined_at = time::now()");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('tenant_member', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(role_id) = input.role_id {
            builder = builder.bind(("role_id", role_id.to_string()));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status_to_str(status)));
        }
        if let Some(invited_by) = input.invited_by {
            builder = builder.bind(("invited_by", invited_by));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("tenant_member", e))?;

        let rows: Vec<MemberRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("tenant_member", id_str))?;

        Ok(row.try_into_member(id)?)
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        self.get_by_id(id).await?;

        self.db
            .query("DELETE type::record('tenant_member', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<TenantMember>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM tenant_member \
                 WHERE tenant_id = $tenant_id GROUP ALL",
            )
            .bind(("tenant_id", tenant_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM tenant_member \
                 WHERE tenant_id = $tenant_id \
                 ORDER BY joined_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MemberRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_member())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_by_user(&self, user_id: &str) -> WardenResult<Vec<TenantMember>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM tenant_member \
                 WHERE user_id = $user_id ORDER BY joined_at ASC",
            )
            .bind(("user_id", user_id.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MemberRowWithId> = result.take(0).map_err(DbError::from)?;
        let members = rows
            .into_iter()
            .map(|row| row.try_into_member())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(members)
    }

    async fn count_by_role(&self, role_id: Uuid) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM tenant_member \
                 WHERE role_id = $role_id GROUP ALL",
            )
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(count_rows.first().map(|r| r.total).unwrap_or(0))
    }
}
