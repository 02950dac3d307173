//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings; enums are stored as lowercase strings with ASSERT
//! constraints. Uniqueness rules live in the store as UNIQUE indexes.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct AppliedMigration {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "lookup_indexes",
        sql: SCHEMA_V2,
    },
    Migration {
        version: 3,
        name: "platform_admins",
        sql: SCHEMA_V3,
    },
];

// -----------------------------------------------------------------------
// Schema v1 — tables, fields and uniqueness
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Permissions (global)
-- =======================================================================
DEFINE TABLE permission SCHEMAFULL;
DEFINE FIELD service ON TABLE permission TYPE string;
DEFINE FIELD entity ON TABLE permission TYPE string;
DEFINE FIELD action ON TABLE permission TYPE string;
DEFINE FIELD description ON TABLE permission TYPE string DEFAULT '';
DEFINE FIELD created_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_permission_triple ON TABLE permission \
    COLUMNS service, entity, action UNIQUE;

-- =======================================================================
-- Policies (system-wide when tenant_id is NONE)
-- =======================================================================
DEFINE TABLE policy SCHEMAFULL;
DEFINE FIELD name ON TABLE policy TYPE string;
DEFINE FIELD description ON TABLE policy TYPE string DEFAULT '';
DEFINE FIELD tenant_id ON TABLE policy TYPE option<string>;
DEFINE FIELD created_at ON TABLE policy TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE policy TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_policy_scope_name ON TABLE policy \
    COLUMNS tenant_id, name UNIQUE;

-- =======================================================================
-- Roles (system-wide when tenant_id is NONE)
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD role_type ON TABLE role TYPE string \
    ASSERT $value IN ['tenant', 'platform'];
DEFINE FIELD description ON TABLE role TYPE string DEFAULT '';
DEFINE FIELD tenant_id ON TABLE role TYPE option<string>;
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_scope_name ON TABLE role \
    COLUMNS tenant_id, name UNIQUE;

-- =======================================================================
-- Tenants
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD slug ON TABLE tenant TYPE string;
DEFINE FIELD status ON TABLE tenant TYPE string \
    ASSERT $value IN ['pending', 'active', 'suspended', 'deleted'];
DEFINE FIELD metadata ON TABLE tenant TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_by ON TABLE tenant TYPE string;
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_slug ON TABLE tenant COLUMNS slug UNIQUE;

-- =======================================================================
-- Tenant members (tenant scope)
-- =======================================================================
DEFINE TABLE tenant_member SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE tenant_member TYPE string;
DEFINE FIELD user_id ON TABLE tenant_member TYPE string;
DEFINE FIELD role_id ON TABLE tenant_member TYPE string;
DEFINE FIELD status ON TABLE tenant_member TYPE string \
    ASSERT $value IN ['active', 'inactive', 'pending'];
DEFINE FIELD invited_by ON TABLE tenant_member TYPE option<string>;
DEFINE FIELD joined_at ON TABLE tenant_member TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD created_at ON TABLE tenant_member TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant_member TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_member_tenant_user ON TABLE tenant_member \
    COLUMNS tenant_id, user_id UNIQUE;

-- =======================================================================
-- User invitations (tenant scope)
-- =======================================================================
DEFINE TABLE user_invitation SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE user_invitation TYPE string;
DEFINE FIELD email ON TABLE user_invitation TYPE string;
DEFINE FIELD invited_by ON TABLE user_invitation TYPE string;
DEFINE FIELD role_id ON TABLE user_invitation TYPE string;
DEFINE FIELD token ON TABLE user_invitation TYPE string;
DEFINE FIELD status ON TABLE user_invitation TYPE string \
    ASSERT $value IN ['pending', 'accepted', 'cancelled', 'expired'];
DEFINE FIELD expires_at ON TABLE user_invitation TYPE datetime;
DEFINE FIELD accepted_at ON TABLE user_invitation TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE user_invitation TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user_invitation TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_invitation_token ON TABLE user_invitation \
    COLUMNS token UNIQUE;

-- =======================================================================
-- System users (machine credentials)
-- =======================================================================
DEFINE TABLE system_user SCHEMAFULL;
DEFINE FIELD name ON TABLE system_user TYPE string;
DEFINE FIELD application_name ON TABLE system_user TYPE string;
DEFINE FIELD email ON TABLE system_user TYPE string;
DEFINE FIELD identity_id ON TABLE system_user TYPE string;
DEFINE FIELD description ON TABLE system_user TYPE string DEFAULT '';
DEFINE FIELD service_type ON TABLE system_user TYPE string \
    ASSERT $value IN ['worker', 'integration', 'cron', 'api'];
DEFINE FIELD is_active ON TABLE system_user TYPE bool DEFAULT true;
DEFINE FIELD is_primary ON TABLE system_user TYPE bool DEFAULT true;
DEFINE FIELD expires_at ON TABLE system_user TYPE option<datetime>;
DEFINE FIELD created_by ON TABLE system_user TYPE string;
DEFINE FIELD metadata ON TABLE system_user TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD last_used_at ON TABLE system_user TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE system_user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE system_user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_system_user_name ON TABLE system_user \
    COLUMNS name UNIQUE;
DEFINE INDEX idx_system_user_identity ON TABLE system_user \
    COLUMNS identity_id UNIQUE;

-- =======================================================================
-- Graph edges
-- =======================================================================
-- Policy -> Permission
DEFINE TABLE grants TYPE RELATION SCHEMAFULL;

-- Role -> Policy
DEFINE TABLE includes TYPE RELATION SCHEMAFULL;
";

// -----------------------------------------------------------------------
// Schema v2 — secondary lookup indexes
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
DEFINE INDEX idx_system_user_application ON TABLE system_user \
    COLUMNS application_name;
DEFINE INDEX idx_invitation_email_status ON TABLE user_invitation \
    COLUMNS email, status;
DEFINE INDEX idx_invitation_tenant ON TABLE user_invitation \
    COLUMNS tenant_id;
DEFINE INDEX idx_member_user ON TABLE tenant_member COLUMNS user_id;
DEFINE INDEX idx_member_role ON TABLE tenant_member COLUMNS role_id;
DEFINE INDEX idx_permission_service ON TABLE permission COLUMNS service;
DEFINE INDEX idx_grants_pair ON TABLE grants COLUMNS in, out UNIQUE;
DEFINE INDEX idx_includes_pair ON TABLE includes COLUMNS in, out UNIQUE;
";

// -----------------------------------------------------------------------
// Schema v3 — platform admin registry
// -----------------------------------------------------------------------

const SCHEMA_V3: &str = "\
DEFINE TABLE platform_admin SCHEMAFULL;
DEFINE FIELD user_id ON TABLE platform_admin TYPE string;
DEFINE FIELD created_by ON TABLE platform_admin TYPE string;
DEFINE FIELD created_at ON TABLE platform_admin TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE platform_admin TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_platform_admin_user ON TABLE platform_admin \
    COLUMNS user_id UNIQUE;
";

/// Apply every migration newer than the recorded schema version.
///
/// Safe to call on every start: applied versions are tracked in the
/// `_migration` table and skipped.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let applied: Vec<AppliedMigration> = result.take(0)?;
    let current_version = applied.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
    {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "could not record v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for tests that bootstrap an in-memory instance without the
/// migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
