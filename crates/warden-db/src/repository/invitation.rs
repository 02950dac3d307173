//! SurrealDB implementation of [`InvitationRepository`].
//!
//! State transitions are conditional updates (`WHERE status = 'pending'`)
//! so two concurrent accept/cancel calls cannot both succeed.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::invitation::{CreateInvitation, InvitationStatus, UserInvitation};
use warden_core::repository::{InvitationRepository, PaginatedResult, Pagination};

use super::CountRow;
use crate::error::{DbError, parse_uuid};

fn parse_status(s: &str) -> Result<InvitationStatus, DbError> {
    match s {
        "pending" => Ok(InvitationStatus::Pending),
        "accepted" => Ok(InvitationStatus::Accepted),
        "cancelled" => Ok(InvitationStatus::Cancelled),
        "expired" => Ok(InvitationStatus::Expired),
        other => Err(DbError::Decode(format!("unknown invitation status: {other}"))),
    }
}

#[derive(Debug, SurrealValue)]
struct InvitationRow {
    tenant_id: String,
    email: String,
    invited_by: String,
    role_id: String,
    token: String,
    status: String,
    expires_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvitationRow {
    fn try_into_invitation(self, id: Uuid) -> Result<UserInvitation, DbError> {
        Ok(UserInvitation {
            id,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            email: self.email,
            invited_by: self.invited_by,
            role_id: parse_uuid("role", &self.role_id)?,
            token: self.token,
            status: parse_status(&self.status)?,
            expires_at: self.expires_at,
            accepted_at: self.accepted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct InvitationRowWithId {
    record_id: String,
    tenant_id: String,
    email: String,
    invited_by: String,
    role_id: String,
    token: String,
    status: String,
    expires_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvitationRowWithId {
    fn try_into_invitation(self) -> Result<UserInvitation, DbError> {
        let id = parse_uuid("user_invitation", &self.record_id)?;
        InvitationRow {
            tenant_id: self.tenant_id,
            email: self.email,
            invited_by: self.invited_by,
            role_id: self.role_id,
            token: self.token,
            status: self.status,
            expires_at: self.expires_at,
            accepted_at: self.accepted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .try_into_invitation(id)
    }
}

fn collect(rows: Vec<InvitationRowWithId>) -> Result<Vec<UserInvitation>, DbError> {
    rows.into_iter()
        .map(InvitationRowWithId::try_into_invitation)
        .collect()
}

/// SurrealDB implementation of the UserInvitation repository.
#[derive(Clone)]
pub struct SurrealInvitationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealInvitationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Conditional status change out of `pending`.
    async fn transition(&self, id: Uuid, assignments: &str) -> WardenResult<UserInvitation> {
        let id_str = id.to_string();
        let query = format!(
            "UPDATE type::record('user_invitation', $id) SET {assignments}, \
             updated_at = time::now() WHERE status = 'pending'"
        );

        let result = self
            .db
            .query(query)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("user_invitation", e))?;

        let rows: Vec<InvitationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("pending user_invitation", id_str))?;

        Ok(row.try_into_invitation(id)?)
    }
}

impl<C: Connection> InvitationRepository for SurrealInvitationRepository<C> {
    async fn create(&self, input: CreateInvitation) -> WardenResult<UserInvitation> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user_invitation', $id) SET \
                 tenant_id = $tenant_id, email = $email, \
                 invited_by = $invited_by, role_id = $role_id, \
                 token = $token, status = 'pending', \
                 expires_at = $expires_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("email", input.email))
            .bind(("invited_by", input.invited_by))
            .bind(("role_id", input.role_id.to_string()))
            .bind(("token", input.token))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("user_invitation", e))?;

        let rows: Vec<InvitationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user_invitation", &id_str))?;

        Ok(row.try_into_invitation(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<UserInvitation> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('user_invitation', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InvitationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user_invitation", id_str))?;

        Ok(row.try_into_invitation(id)?)
    }

    async fn get_by_token(&self, token: &str) -> WardenResult<UserInvitation> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_invitation \
                 WHERE token = $token LIMIT 1",
            )
            .bind(("token", token.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InvitationRowWithId> = result.take(0).map_err(DbError::from)?;
        // Never echo the token back in the error.
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user_invitation", "token"))?;

        Ok(row.try_into_invitation()?)
    }

    async fn list_pending_by_email(&self, email: &str) -> WardenResult<Vec<UserInvitation>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_invitation \
                 WHERE email = $email AND status = 'pending' \
                 AND expires_at > time::now() \
                 ORDER BY created_at DESC",
            )
            .bind(("email", email.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InvitationRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn get_pending_for(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> WardenResult<Option<UserInvitation>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user_invitation \
                 WHERE tenant_id = $tenant_id AND email = $email \
                 AND status = 'pending' AND expires_at > time::now() \
                 LIMIT 1",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("email", email.to_owned()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InvitationRowWithId> = result.take(0).map_err(DbError::from)?;
        let invitation = rows
            .into_iter()
            .next()
            .map(InvitationRowWithId::try_into_invitation)
            .transpose()?;

        Ok(invitation)
    }

    async fn mark_accepted(&self, id: Uuid) -> WardenResult<UserInvitation> {
        self.transition(id, "status = 'accepted', accepted_at = time::now()")
            .await
    }

    async fn mark_cancelled(&self, id: Uuid) -> WardenResult<UserInvitation> {
        self.transition(id, "status = 'cancelled'").await
    }

    async fn mark_expired(&self, id: Uuid) -> WardenResult<UserInvitation> {
        self.transition(id, "status = 'expired'").await
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<UserInvitation>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM user_invitation \
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
                "SELECT meta::id(id) AS record_id, * FROM user_invitation \
                 WHERE tenant_id = $tenant_id \
                 ORDER BY created_at DESC \
                 LIMIT $limit START $offset",
            )
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InvitationRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: collect(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn expire_stale(&self) -> WardenResult<u64> {
        let result = self
            .db
            .query(
                "UPDATE user_invitation SET status = 'expired', \
                 updated_at = time::now() \
                 WHERE status = 'pending' AND expires_at <= time::now()",
            )
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("user_invitation", e))?;

        let rows: Vec<InvitationRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }
}
