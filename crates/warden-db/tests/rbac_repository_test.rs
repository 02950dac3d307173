//! Integration tests for the Permission, Policy and Role repositories
//! using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::permission::CreatePermission;
use warden_core::models::policy::{CreatePolicy, UpdatePolicy};
use warden_core::models::role::{CreateRole, RoleType, UpdateRole};
use warden_core::repository::{PermissionRepository, PolicyRepository, RoleRepository};
use warden_db::repository::{
    SurrealPermissionRepository, SurrealPolicyRepository, SurrealRoleRepository,
};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    db
}

fn permission(service: &str, entity: &str, action: &str) -> CreatePermission {
    CreatePermission {
        service: service.into(),
        entity: entity.into(),
        action: action.into(),
        description: format!("{action} {entity}"),
    }
}

fn policy(name: &str, tenant_id: Option<Uuid>) -> CreatePolicy {
    CreatePolicy {
        name: name.into(),
        description: String::new(),
        tenant_id,
    }
}

fn role(name: &str, tenant_id: Option<Uuid>) -> CreateRole {
    CreateRole {
        name: name.into(),
        role_type: RoleType::Tenant,
        description: String::new(),
        tenant_id,
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_and_lookup_permission_by_triple() {
    let db = setup().await;
    let repo = SurrealPermissionRepository::new(db);

    let created = repo
        .create(permission("billing", "invoice", "read"))
        .await
        .unwrap();
    assert_eq!(created.key(), "billing:invoice:read");

    let by_id = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(by_id, created);

    let by_triple = repo
        .get_by_triple("billing", "invoice", "read")
        .await
        .unwrap();
    assert_eq!(by_triple.id, created.id);

    let missing = repo.get_by_triple("billing", "invoice", "delete").await;
    assert!(matches!(missing, Err(WardenError::NotFound { .. })));
}

#[tokio::test]
async fn duplicate_permission_triple_rejected() {
    let db = setup().await;
    let repo = SurrealPermissionRepository::new(db);

    repo.create(permission("billing", "invoice", "read"))
        .await
        .unwrap();
    let result = repo.create(permission("billing", "invoice", "read")).await;

    assert!(
        matches!(result, Err(WardenError::AlreadyExists { .. })),
        "duplicate triple should be rejected, got {result:?}"
    );
}

#[tokio::test]
async fn list_permissions_by_service() {
    let db = setup().await;
    let repo = SurrealPermissionRepository::new(db);

    repo.create(permission("billing", "invoice", "read"))
        .await
        .unwrap();
    repo.create(permission("billing", "invoice", "write"))
        .await
        .unwrap();
    repo.create(permission("crm", "contact", "read"))
        .await
        .unwrap();

    assert_eq!(repo.list_all().await.unwrap().len(), 3);

    let billing = repo.list_by_service("billing").await.unwrap();
    assert_eq!(billing.len(), 2);
    assert!(billing.iter().all(|p| p.service == "billing"));
}

#[tokio::test]
async fn deleting_permission_unlinks_it_from_policies() {
    let db = setup().await;
    let perms = SurrealPermissionRepository::new(db.clone());
    let policies = SurrealPolicyRepository::new(db);

    let read = perms
        .create(permission("billing", "invoice", "read"))
        .await
        .unwrap();
    let write = perms
        .create(permission("billing", "invoice", "write"))
        .await
        .unwrap();
    let p = policies.create(policy("Invoices", None)).await.unwrap();
    policies.attach_permission(p.id, read.id).await.unwrap();
    policies.attach_permission(p.id, write.id).await.unwrap();

    perms.delete(read.id).await.unwrap();

    let remaining = policies.get_permissions(p.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, write.id);
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attach_permission_is_idempotent() {
    let db = setup().await;
    let perms = SurrealPermissionRepository::new(db.clone());
    let policies = SurrealPolicyRepository::new(db);

    let read = perms
        .create(permission("billing", "invoice", "read"))
        .await
        .unwrap();
    let p = policies.create(policy("Readers", None)).await.unwrap();

    policies.attach_permission(p.id, read.id).await.unwrap();
    policies.attach_permission(p.id, read.id).await.unwrap();

    let attached = policies.get_permissions(p.id).await.unwrap();
    assert_eq!(attached.len(), 1);

    policies.detach_permission(p.id, read.id).await.unwrap();
    assert!(policies.get_permissions(p.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn policy_lookup_is_scope_exact() {
    let db = setup().await;
    let repo = SurrealPolicyRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let system = repo.create(policy("Viewer", None)).await.unwrap();
    let tenant = repo.create(policy("Viewer", Some(tenant_id))).await.unwrap();

    assert!(system.is_system);
    assert!(!tenant.is_system);

    let found = repo.get_by_name("Viewer", None).await.unwrap();
    assert_eq!(found.id, system.id);
    let found = repo.get_by_name("Viewer", Some(tenant_id)).await.unwrap();
    assert_eq!(found.id, tenant.id);

    // Tenant listing includes system policies; system listing does not
    // include tenant ones.
    assert_eq!(repo.list(Some(tenant_id)).await.unwrap().len(), 2);
    assert_eq!(repo.list(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_policy_name_within_tenant_rejected() {
    let db = setup().await;
    let repo = SurrealPolicyRepository::new(db);
    let tenant_id = Uuid::new_v4();

    repo.create(policy("Editors", Some(tenant_id))).await.unwrap();
    let result = repo.create(policy("Editors", Some(tenant_id))).await;

    assert!(matches!(result, Err(WardenError::AlreadyExists { .. })));
}

#[tokio::test]
async fn update_policy_keeps_unset_fields() {
    let db = setup().await;
    let repo = SurrealPolicyRepository::new(db);

    let created = repo
        .create(CreatePolicy {
            name: "Billing".into(),
            description: "Invoices".into(),
            tenant_id: None,
        })
        .await
        .unwrap();

    let updated = repo
        .update(
            created.id,
            UpdatePolicy {
                name: Some("Billing Admin".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Billing Admin");
    assert_eq!(updated.description, "Invoices");
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn effective_permissions_are_deduplicated() {
    let db = setup().await;
    let perms = SurrealPermissionRepository::new(db.clone());
    let policies = SurrealPolicyRepository::new(db.clone());
    let roles = SurrealRoleRepository::new(db);

    let read = perms
        .create(permission("billing", "invoice", "read"))
        .await
        .unwrap();
    let write = perms
        .create(permission("billing", "invoice", "write"))
        .await
        .unwrap();

    let readers = policies.create(policy("Readers", None)).await.unwrap();
    let writers = policies.create(policy("Writers", None)).await.unwrap();
    policies.attach_permission(readers.id, read.id).await.unwrap();
    policies.attach_permission(writers.id, read.id).await.unwrap();
    policies.attach_permission(writers.id, write.id).await.unwrap();

    let r = roles.create(role("Accountant", None)).await.unwrap();
    roles.attach_policy(r.id, readers.id).await.unwrap();
    roles.attach_policy(r.id, writers.id).await.unwrap();
    roles.attach_policy(r.id, writers.id).await.unwrap();

    assert_eq!(roles.get_policies(r.id).await.unwrap().len(), 2);

    let effective = roles.get_effective_permissions(r.id).await.unwrap();
    let mut keys: Vec<String> = effective.iter().map(|p| p.key()).collect();
    keys.sort();
    assert_eq!(keys, vec!["billing:invoice:read", "billing:invoice:write"]);
}

#[tokio::test]
async fn deleting_policy_unlinks_it_from_roles() {
    let db = setup().await;
    let policies = SurrealPolicyRepository::new(db.clone());
    let roles = SurrealRoleRepository::new(db);

    let p = policies.create(policy("Temp", None)).await.unwrap();
    let r = roles.create(role("Ops", None)).await.unwrap();
    roles.attach_policy(r.id, p.id).await.unwrap();

    policies.delete(p.id).await.unwrap();

    assert!(roles.get_policies(r.id).await.unwrap().is_empty());
    assert!(matches!(
        policies.get_by_id(p.id).await,
        Err(WardenError::NotFound { .. })
    ));
}

#[tokio::test]
async fn update_and_delete_role() {
    let db = setup().await;
    let repo = SurrealRoleRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let created = repo
        .create(CreateRole {
            name: "Support".into(),
            role_type: RoleType::Tenant,
            description: "Helpdesk".into(),
            tenant_id: Some(tenant_id),
        })
        .await
        .unwrap();
    assert!(!created.is_system);

    let updated = repo
        .update(
            created.id,
            UpdateRole {
                role_type: Some(RoleType::Platform),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.role_type, RoleType::Platform);
    assert_eq!(updated.description, "Helpdesk");

    repo.delete(created.id).await.unwrap();
    assert!(repo.get_by_id(created.id).await.is_err());
    assert!(repo.delete(created.id).await.is_err());
}

#[tokio::test]
async fn role_name_scopes_are_separate() {
    let db = setup().await;
    let repo = SurrealRoleRepository::new(db);
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();

    let system = repo.create(role("Admin", None)).await.unwrap();
    let a = repo.create(role("Admin", Some(tenant_a))).await.unwrap();

    assert_eq!(repo.get_by_name("Admin", None).await.unwrap().id, system.id);
    assert_eq!(
        repo.get_by_name("Admin", Some(tenant_a)).await.unwrap().id,
        a.id
    );
    assert!(repo.get_by_name("Admin", Some(tenant_b)).await.is_err());

    let listed = repo.list(Some(tenant_b)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_system);
}
