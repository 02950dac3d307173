//! Integration tests for the Tenant, TenantMember and Invitation
//! repositories using in-memory SurrealDB.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::invitation::{CreateInvitation, InvitationStatus};
use warden_core::models::member::{CreateTenantMember, MemberStatus, UpdateTenantMember};
use warden_core::models::tenant::{CreateTenant, TenantStatus, UpdateTenant};
use warden_core::repository::{
    InvitationRepository, Pagination, TenantMemberRepository, TenantRepository,
};
use warden_db::repository::{
    SurrealInvitationRepository, SurrealTenantMemberRepository, SurrealTenantRepository,
};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    db
}

fn tenant(slug: &str) -> CreateTenant {
    CreateTenant {
        name: format!("Tenant {slug}"),
        slug: slug.into(),
        status: TenantStatus::Pending,
        metadata: None,
        created_by: "user-1".into(),
    }
}

fn member(tenant_id: Uuid, user_id: &str, role_id: Uuid) -> CreateTenantMember {
    CreateTenantMember {
        tenant_id,
        user_id: user_id.into(),
        role_id,
        status: MemberStatus::Active,
        invited_by: None,
    }
}

fn invitation(tenant_id: Uuid, email: &str, expires_in: Duration) -> CreateInvitation {
    CreateInvitation {
        tenant_id,
        email: email.into(),
        invited_by: "user-1".into(),
        role_id: Uuid::new_v4(),
        token: hex_token(),
        expires_at: Utc::now() + expires_in,
    }
}

fn hex_token() -> String {
    Uuid::new_v4().simple().to_string().repeat(2)
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_tenant_with_default_metadata() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    let created = repo.create(tenant("acme")).await.unwrap();
    assert_eq!(created.status, TenantStatus::Pending);
    assert_eq!(created.metadata, serde_json::json!({}));

    let by_slug = repo.get_by_slug("acme").await.unwrap();
    assert_eq!(by_slug.id, created.id);
}

#[tokio::test]
async fn duplicate_slug_rejected() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    repo.create(tenant("acme")).await.unwrap();
    let result = repo.create(tenant("acme")).await;

    assert!(matches!(result, Err(WardenError::AlreadyExists { .. })));
}

#[tokio::test]
async fn update_tenant_status_and_metadata() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    let created = repo.create(tenant("acme")).await.unwrap();
    let updated = repo
        .update(
            created.id,
            UpdateTenant {
                status: Some(TenantStatus::Active),
                metadata: Some(serde_json::json!({"plan": "pro"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, TenantStatus::Active);
    assert_eq!(updated.metadata["plan"], "pro");
    assert_eq!(updated.name, created.name);
}

#[tokio::test]
async fn list_tenants_with_pagination() {
    let db = setup().await;
    let repo = SurrealTenantRepository::new(db);

    for i in 0..5 {
        repo.create(tenant(&format!("tenant-{i}"))).await.unwrap();
    }

    let page1 = repo
        .list(Pagination {
            offset: 0,
            limit: 3,
        })
        .await
        .unwrap();
    assert_eq!(page1.items.len(), 3);
    assert_eq!(page1.total, 5);

    let page2 = repo.list(Pagination::page(2, 3)).await.unwrap();
    assert_eq!(page2.items.len(), 2);
}

#[tokio::test]
async fn list_by_member_only_counts_active_memberships() {
    let db = setup().await;
    let tenants = SurrealTenantRepository::new(db.clone());
    let members = SurrealTenantMemberRepository::new(db);
    let role_id = Uuid::new_v4();

    let a = tenants.create(tenant("alpha")).await.unwrap();
    let b = tenants.create(tenant("beta")).await.unwrap();
    tenants.create(tenant("gamma")).await.unwrap();

    members.create(member(a.id, "alice", role_id)).await.unwrap();
    members
        .create(CreateTenantMember {
            status: MemberStatus::Inactive,
            ..member(b.id, "alice", role_id)
        })
        .await
        .unwrap();

    let page = tenants
        .list_by_member("alice", Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, a.id);
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_membership_per_tenant_and_user() {
    let db = setup().await;
    let repo = SurrealTenantMemberRepository::new(db);
    let tenant_id = Uuid::new_v4();

    repo.create(member(tenant_id, "alice", Uuid::new_v4()))
        .await
        .unwrap();
    let result = repo
        .create(member(tenant_id, "alice", Uuid::new_v4()))
        .await;

    assert!(matches!(result, Err(WardenError::AlreadyExists { .. })));
}

#[tokio::test]
async fn update_member_role_and_status() {
    let db = setup().await;
    let repo = SurrealTenantMemberRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    let created = repo.create(member(tenant_id, "bob", admin)).await.unwrap();
    assert_eq!(repo.count_by_role(admin).await.unwrap(), 1);

    let updated = repo
        .update(
            created.id,
            UpdateTenantMember {
                role_id: Some(viewer),
                status: Some(MemberStatus::Inactive),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.role_id, viewer);
    assert!(!updated.is_active());
    assert_eq!(repo.count_by_role(admin).await.unwrap(), 0);

    let fetched = repo.get_by_tenant_and_user(tenant_id, "bob").await.unwrap();
    assert_eq!(fetched.id, created.id);
}

#[tokio::test]
async fn list_and_delete_members() {
    let db = setup().await;
    let repo = SurrealTenantMemberRepository::new(db);
    let tenant_id = Uuid::new_v4();
    let role_id = Uuid::new_v4();

    let a = repo.create(member(tenant_id, "a", role_id)).await.unwrap();
    repo.create(member(tenant_id, "b", role_id)).await.unwrap();
    repo.create(member(Uuid::new_v4(), "a", role_id))
        .await
        .unwrap();

    let page = repo
        .list_by_tenant(tenant_id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(repo.list_by_user("a").await.unwrap().len(), 2);

    repo.delete(a.id).await.unwrap();
    assert!(matches!(
        repo.get_by_tenant_and_user(tenant_id, "a").await,
        Err(WardenError::NotFound { .. })
    ));
    assert!(repo.delete(a.id).await.is_err());
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_and_lookup_invitation_by_token() {
    let db = setup().await;
    let repo = SurrealInvitationRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let input = invitation(tenant_id, "owner@acme.com", Duration::hours(72));
    let token = input.token.clone();
    let created = repo.create(input).await.unwrap();

    assert_eq!(created.status, InvitationStatus::Pending);
    assert!(created.accepted_at.is_none());

    let by_token = repo.get_by_token(&token).await.unwrap();
    assert_eq!(by_token.id, created.id);

    let pending = repo
        .get_pending_for(tenant_id, "owner@acme.com")
        .await
        .unwrap();
    assert_eq!(pending.map(|i| i.id), Some(created.id));
    assert_eq!(
        repo.list_pending_by_email("owner@acme.com")
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn accept_only_succeeds_once() {
    let db = setup().await;
    let repo = SurrealInvitationRepository::new(db);

    let created = repo
        .create(invitation(Uuid::new_v4(), "a@b.com", Duration::hours(1)))
        .await
        .unwrap();

    let accepted = repo.mark_accepted(created.id).await.unwrap();
    assert_eq!(accepted.status, InvitationStatus::Accepted);
    assert!(accepted.accepted_at.is_some());

    assert!(matches!(
        repo.mark_accepted(created.id).await,
        Err(WardenError::NotFound { .. })
    ));
    assert!(repo.mark_cancelled(created.id).await.is_err());
}

#[tokio::test]
async fn cancelled_invitation_is_not_pending() {
    let db = setup().await;
    let repo = SurrealInvitationRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let created = repo
        .create(invitation(tenant_id, "a@b.com", Duration::hours(1)))
        .await
        .unwrap();
    let cancelled = repo.mark_cancelled(created.id).await.unwrap();
    assert_eq!(cancelled.status, InvitationStatus::Cancelled);

    assert!(
        repo.get_pending_for(tenant_id, "a@b.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn mark_expired_only_moves_pending_invitations() {
    let db = setup().await;
    let repo = SurrealInvitationRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let overdue = repo
        .create(invitation(tenant_id, "late@b.com", Duration::hours(-1)))
        .await
        .unwrap();
    let expired = repo.mark_expired(overdue.id).await.unwrap();
    assert_eq!(expired.status, InvitationStatus::Expired);
    assert!(matches!(
        repo.mark_expired(overdue.id).await,
        Err(WardenError::NotFound { .. })
    ));
    assert!(repo.mark_accepted(overdue.id).await.is_err());
}

#[tokio::test]
async fn expire_stale_flips_only_overdue_pending_invitations() {
    let db = setup().await;
    let repo = SurrealInvitationRepository::new(db);
    let tenant_id = Uuid::new_v4();

    let overdue = repo
        .create(invitation(tenant_id, "late@b.com", Duration::hours(-1)))
        .await
        .unwrap();
    let fresh = repo
        .create(invitation(tenant_id, "fresh@b.com", Duration::hours(1)))
        .await
        .unwrap();

    // Overdue invitations never show up as pending.
    assert!(
        repo.list_pending_by_email("late@b.com")
            .await
            .unwrap()
            .is_empty()
    );

    assert_eq!(repo.expire_stale().await.unwrap(), 1);
    assert_eq!(repo.expire_stale().await.unwrap(), 0);

    assert_eq!(
        repo.get_by_id(overdue.id).await.unwrap().status,
        InvitationStatus::Expired
    );
    assert_eq!(
        repo.get_by_id(fresh.id).await.unwrap().status,
        InvitationStatus::Pending
    );

    let page = repo
        .list_by_tenant(tenant_id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}
