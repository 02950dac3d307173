//! Integration tests for tenants, memberships and the invitation state
//! machine, with a recording job dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_admin::config::InvitationConfig;
use warden_admin::invitation::{InvitationService, NewInvitation};
use warden_admin::member::MemberService;
use warden_admin::rbac::RbacService;
use warden_admin::tenant::{NewTenant, TenantService};
use warden_core::dispatch::{JobDispatcher, NewTask, TaskHandle, TaskKind};
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::invitation::{CreateInvitation, InvitationStatus};
use warden_core::models::member::{
    CreateTenantMember, MemberStatus, TenantMember, UpdateTenantMember,
};
use warden_core::models::role::{CreateRole, Role, RoleType};
use warden_core::models::tenant::{Tenant, TenantStatus};
use warden_core::repository::{
    InvitationRepository, PaginatedResult, Pagination, RoleRepository, TenantMemberRepository,
};
use warden_db::repository::{
    SurrealInvitationRepository, SurrealPermissionRepository, SurrealPolicyRepository,
    SurrealRoleRepository, SurrealTenantMemberRepository, SurrealTenantRepository,
};

#[derive(Clone, Default)]
struct RecordingDispatcher {
    tasks: Arc<Mutex<Vec<NewTask>>>,
    offline: Arc<AtomicBool>,
}

impl RecordingDispatcher {
    fn kinds(&self) -> Vec<TaskKind> {
        self.tasks.lock().unwrap().iter().map(|t| t.kind).collect()
    }

    fn count(&self, kind: TaskKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

impl JobDispatcher for RecordingDispatcher {
    async fn enqueue(&self, task: NewTask) -> WardenResult<TaskHandle> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(WardenError::Queue("redis unreachable".into()));
        }
        let handle = TaskHandle {
            id: Uuid::new_v4(),
            kind: task.kind,
            queue: task.queue,
        };
        self.tasks.lock().unwrap().push(task);
        Ok(handle)
    }
}

type Tenants = TenantService<
    SurrealTenantRepository<Db>,
    SurrealRoleRepository<Db>,
    SurrealTenantMemberRepository<Db>,
    SurrealInvitationRepository<Db>,
    RecordingDispatcher,
>;
type Invitations = InvitationService<
    SurrealInvitationRepository<Db>,
    SurrealTenantRepository<Db>,
    SurrealRoleRepository<Db>,
    SurrealTenantMemberRepository<Db>,
    RecordingDispatcher,
>;
type Members = MemberService<
    SurrealTenantMemberRepository<Db>,
    SurrealTenantRepository<Db>,
    SurrealRoleRepository<Db>,
>;

struct Harness {
    tenants: Tenants,
    invitations: Invitations,
    members: Members,
    invitation_repo: SurrealInvitationRepository<Db>,
    role_repo: SurrealRoleRepository<Db>,
    dispatcher: RecordingDispatcher,
    admin: Option<Role>,
    member: Option<Role>,
}

async fn setup_with(bootstrap: bool) -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();

    let tenant_repo = SurrealTenantRepository::new(db.clone());
    let role_repo = SurrealRoleRepository::new(db.clone());
    let member_repo = SurrealTenantMemberRepository::new(db.clone());
    let invitation_repo = SurrealInvitationRepository::new(db.clone());
    let dispatcher = RecordingDispatcher::default();

    let (admin, member) = if bootstrap {
        let rbac = RbacService::new(
            SurrealPermissionRepository::new(db.clone()),
            SurrealPolicyRepository::new(db.clone()),
            role_repo.clone(),
            member_repo.clone(),
        );
        let (admin, member) = rbac.bootstrap_defaults().await.unwrap();
        (Some(admin), Some(member))
    } else {
        (None, None)
    };

    Harness {
        tenants: TenantService::new(
            tenant_repo.clone(),
            role_repo.clone(),
            member_repo.clone(),
            invitation_repo.clone(),
            dispatcher.clone(),
            InvitationConfig::default(),
        ),
        invitations: InvitationService::new(
            invitation_repo.clone(),
            tenant_repo.clone(),
            role_repo.clone(),
            member_repo.clone(),
            dispatcher.clone(),
            InvitationConfig::default(),
        ),
        members: MemberService::new(member_repo, tenant_repo, role_repo.clone()),
        invitation_repo,
        role_repo,
        dispatcher,
        admin,
        member,
    }
}

async fn setup() -> Harness {
    setup_with(true).await
}

fn new_tenant(slug: &str) -> NewTenant {
    NewTenant {
        name: "Acme Co".into(),
        slug: slug.into(),
        metadata: None,
        created_by: "admin-1".into(),
    }
}

impl Harness {
    fn admin_id(&self) -> Uuid {
        self.admin.as_ref().unwrap().id
    }

    fn member_id(&self) -> Uuid {
        self.member.as_ref().unwrap().id
    }

    async fn tenant(&self, slug: &str) -> Tenant {
        self.tenants.create_tenant(new_tenant(slug)).await.unwrap()
    }

    async fn invite(&self, tenant_id: Uuid, email: &str, role_id: Uuid) -> WardenResult<String> {
        self.invitations
            .create_invitation(NewInvitation {
                tenant_id,
                email: email.into(),
                role_id,
                invited_by: "admin-1".into(),
            })
            .await
            .map(|i| i.token)
    }
}

/// Scenarios B and C: invite the owner of a pending tenant, accept,
/// then try the same token again.
#[tokio::test]
async fn invitation_end_to_end() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;
    assert_eq!(tenant.status, TenantStatus::Pending);

    let invitation = h
        .invitations
        .create_invitation(NewInvitation {
            tenant_id: tenant.id,
            email: "owner@acme.com".into(),
            role_id: h.admin_id(),
            invited_by: "admin-1".into(),
        })
        .await
        .unwrap();
    assert_eq!(invitation.status, InvitationStatus::Pending);
    assert_eq!(invitation.token.len(), 64);
    assert!(invitation.expires_at > Utc::now() + Duration::hours(71));
    assert_eq!(h.dispatcher.count(TaskKind::InvitationEmail), 1);

    let inits_before = h.dispatcher.count(TaskKind::TenantInitialize);
    let member = h
        .invitations
        .accept_invitation(&invitation.token, "u1")
        .await
        .unwrap();
    assert_eq!(member.role_id, h.admin_id());
    assert_eq!(member.tenant_id, tenant.id);
    assert_eq!(member.status, MemberStatus::Active);
    assert_eq!(member.invited_by.as_deref(), Some("admin-1"));

    let stored = h.invitations.get_invitation(invitation.id).await.unwrap();
    assert_eq!(stored.status, InvitationStatus::Accepted);
    assert!(stored.accepted_at.is_some());
    assert_eq!(
        h.dispatcher.count(TaskKind::TenantInitialize),
        inits_before + 1
    );

    let err = h
        .invitations
        .accept_invitation(&invitation.token, "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidState { .. }));
    let err = h
        .invitations
        .accept_invitation(&invitation.token, "u2")
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidState { .. }));
}

#[tokio::test]
async fn self_serve_tenant_makes_creator_admin() {
    let h = setup().await;
    let tenant = h
        .tenants
        .create_tenant(new_tenant("  Acme  Co "))
        .await
        .unwrap();
    assert_eq!(tenant.slug, "acme-co");
    assert_eq!(tenant.created_by, "admin-1");

    let member = h.members.get_member(tenant.id, "admin-1").await.unwrap();
    assert_eq!(member.role_id, h.admin_id());
    assert!(member.is_active());
    assert_eq!(h.dispatcher.kinds(), vec![TaskKind::TenantInitialize]);

    let err = h
        .tenants
        .create_tenant(new_tenant("acme_co"))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::AlreadyExists { .. }));

    let err = h.tenants.create_tenant(new_tenant(" -- ")).await.unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }));
}

#[tokio::test]
async fn tenant_creation_requires_admin_role() {
    let h = setup_with(false).await;
    let err = h
        .tenants
        .create_tenant(new_tenant("acme-co"))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidState { .. }));
    assert!(h.dispatcher.kinds().is_empty());
}

#[tokio::test]
async fn tenant_creation_survives_dispatcher_outage() {
    let h = setup().await;
    h.dispatcher.offline.store(true, Ordering::SeqCst);

    let tenant = h.tenant("acme-co").await;
    let token = h
        .invite(tenant.id, "owner@acme.com", h.member_id())
        .await
        .unwrap();

    assert!(h.dispatcher.kinds().is_empty());
    assert!(h.invitations.get_by_token(&token).await.unwrap().is_pending());
}

#[tokio::test]
async fn managed_tenant_is_initialised_on_acceptance() {
    let h = setup().await;
    let (tenant, invitation) = h
        .tenants
        .create_managed_tenant(new_tenant("globex"), "Owner@Globex.com")
        .await
        .unwrap();

    assert_eq!(tenant.status, TenantStatus::Pending);
    assert_eq!(invitation.email, "owner@globex.com");
    assert_eq!(invitation.role_id, h.admin_id());
    assert!(h.members.get_member(tenant.id, "admin-1").await.is_err());
    assert_eq!(h.dispatcher.kinds(), vec![TaskKind::InvitationEmail]);

    h.invitations
        .accept_invitation(&invitation.token, "owner-1")
        .await
        .unwrap();
    assert_eq!(
        h.dispatcher.kinds(),
        vec![TaskKind::InvitationEmail, TaskKind::TenantInitialize]
    );
}

#[tokio::test]
async fn acceptance_into_active_tenant_skips_initialisation() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;
    h.tenants.mark_active(tenant.id).await.unwrap();
    let inits = h.dispatcher.count(TaskKind::TenantInitialize);

    let token = h
        .invite(tenant.id, "dev@acme.com", h.member_id())
        .await
        .unwrap();
    h.invitations.accept_invitation(&token, "u2").await.unwrap();

    assert_eq!(h.dispatcher.count(TaskKind::TenantInitialize), inits);
}

#[tokio::test]
async fn duplicate_pending_invitation_conflicts() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;
    h.invite(tenant.id, "dev@acme.com", h.member_id())
        .await
        .unwrap();

    let err = h
        .invite(tenant.id, "  DEV@acme.com", h.member_id())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Conflict { .. }));

    let other = h.tenant("globex").await;
    h.invite(other.id, "dev@acme.com", h.member_id())
        .await
        .unwrap();
}

#[tokio::test]
async fn invitation_requires_existing_tenant_and_role_in_scope() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;
    let other = h.tenant("globex").await;

    let err = h
        .invite(Uuid::new_v4(), "dev@acme.com", h.member_id())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));

    let err = h
        .invite(tenant.id, "dev@acme.com", Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));

    let foreign = h
        .role_repo
        .create(CreateRole {
            name: "Auditor".into(),
            role_type: RoleType::Tenant,
            description: String::new(),
            tenant_id: Some(other.id),
        })
        .await
        .unwrap();
    let err = h
        .invite(tenant.id, "dev@acme.com", foreign.id)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }));

    let err = h
        .invite(tenant.id, "not-an-email", h.member_id())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }));
}

#[tokio::test]
async fn expired_invitation_cannot_be_accepted() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;

    let stale = h
        .invitation_repo
        .create(CreateInvitation {
            tenant_id: tenant.id,
            email: "late@acme.com".into(),
            invited_by: "admin-1".into(),
            role_id: h.member_id(),
            token: "ab".repeat(32),
            expires_at: Utc::now() - Duration::minutes(5),
        })
        .await
        .unwrap();

    let err = h
        .invitations
        .accept_invitation(&stale.token, "u9")
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidState { .. }));
    assert!(h.members.get_member(tenant.id, "u9").await.is_err());

    // The failed attempt settles the invitation as expired.
    assert_eq!(
        h.invitations.get_invitation(stale.id).await.unwrap().status,
        InvitationStatus::Expired
    );
    let again = h
        .invitations
        .accept_invitation(&stale.token, "u9")
        .await
        .unwrap_err();
    assert!(matches!(again, WardenError::InvalidState { .. }));

    // Expired invitations do not block a new one.
    h.invite(tenant.id, "late@acme.com", h.member_id())
        .await
        .unwrap();
    assert_eq!(h.invitations.expire_old_invitations().await.unwrap(), 0);
}

#[tokio::test]
async fn sweep_expires_unvisited_invitations() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;

    let stale = h
        .invitation_repo
        .create(CreateInvitation {
            tenant_id: tenant.id,
            email: "quiet@acme.com".into(),
            invited_by: "admin-1".into(),
            role_id: h.member_id(),
            token: "cd".repeat(32),
            expires_at: Utc::now() - Duration::minutes(5),
        })
        .await
        .unwrap();

    assert_eq!(h.invitations.expire_old_invitations().await.unwrap(), 1);
    assert_eq!(h.invitations.expire_old_invitations().await.unwrap(), 0);
    assert_eq!(
        h.invitations.get_invitation(stale.id).await.unwrap().status,
        InvitationStatus::Expired
    );
}

#[tokio::test]
async fn cancelled_invitation_is_terminal() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;
    let token = h
        .invite(tenant.id, "dev@acme.com", h.member_id())
        .await
        .unwrap();
    let invitation = h.invitations.get_by_token(&token).await.unwrap();

    let cancelled = h.invitations.cancel_invitation(invitation.id).await.unwrap();
    assert_eq!(cancelled.status, InvitationStatus::Cancelled);

    let err = h.invitations.cancel_invitation(invitation.id).await.unwrap_err();
    assert!(matches!(err, WardenError::InvalidState { .. }));
    let err = h
        .invitations
        .accept_invitation(&token, "u3")
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidState { .. }));

    let err = h
        .invitations
        .cancel_invitation(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
    let err = h
        .invitations
        .accept_invitation("deadbeef", "u3")
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

#[tokio::test]
async fn active_member_cannot_accept_again() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;

    let token = h
        .invite(tenant.id, "admin@acme.com", h.member_id())
        .await
        .unwrap();
    let err = h
        .invitations
        .accept_invitation(&token, "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Conflict { .. }));
    assert!(h.invitations.get_by_token(&token).await.unwrap().is_pending());
}

#[tokio::test]
async fn inactive_member_is_reactivated_with_invited_role() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;
    let existing = h
        .members
        .add_member(tenant.id, "u4", h.member_id(), None)
        .await
        .unwrap();
    h.members
        .update_member(existing.id, None, Some(MemberStatus::Inactive))
        .await
        .unwrap();

    let token = h
        .invite(tenant.id, "u4@acme.com", h.admin_id())
        .await
        .unwrap();
    let member = h.invitations.accept_invitation(&token, "u4").await.unwrap();

    assert_eq!(member.id, existing.id);
    assert_eq!(member.role_id, h.admin_id());
    assert!(member.is_active());
    let page = h
        .members
        .list_members(tenant.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn pending_invitations_are_claimed_at_sign_up() {
    let h = setup().await;
    let acme = h.tenant("acme-co").await;
    let globex = h.tenant("globex").await;
    let initech = h.tenant("initech").await;

    h.invite(acme.id, "new@user.io", h.member_id()).await.unwrap();
    h.invite(globex.id, "New@User.io", h.member_id()).await.unwrap();
    let cancelled = h
        .invite(initech.id, "new@user.io", h.member_id())
        .await
        .unwrap();
    let cancelled = h.invitations.get_by_token(&cancelled).await.unwrap();
    h.invitations.cancel_invitation(cancelled.id).await.unwrap();

    // Already an active member of globex, so that one is skipped.
    h.members
        .add_member(globex.id, "user-7", h.member_id(), None)
        .await
        .unwrap();

    let joined = h
        .invitations
        .check_and_accept_pending_invitations("NEW@user.io", "user-7")
        .await
        .unwrap();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].tenant_id, acme.id);
}

#[tokio::test]
async fn tenant_lifecycle_operations() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;
    h.tenant("globex").await;

    assert_eq!(
        h.tenants.get_tenant_status(tenant.id).await.unwrap(),
        TenantStatus::Pending
    );
    let active = h.tenants.mark_active(tenant.id).await.unwrap();
    assert_eq!(active.status, TenantStatus::Active);
    let again = h.tenants.mark_active(tenant.id).await.unwrap();
    assert_eq!(again.updated_at, active.updated_at);

    let by_slug = h.tenants.get_tenant_by_slug("Acme Co").await.unwrap();
    assert_eq!(by_slug.id, tenant.id);

    let mine = h
        .tenants
        .get_user_tenants("admin-1", Pagination::default())
        .await
        .unwrap();
    assert_eq!(mine.total, 2);
    assert_eq!(
        h.tenants
            .list_tenants(Pagination::page(1, 1))
            .await
            .unwrap()
            .items
            .len(),
        1
    );

    let deleted = h.tenants.delete_tenant(tenant.id).await.unwrap();
    assert_eq!(deleted.status, TenantStatus::Deleted);
    assert!(h.tenants.get_tenant(tenant.id).await.is_ok());
    let err = h.tenants.mark_active(tenant.id).await.unwrap_err();
    assert!(matches!(err, WardenError::InvalidState { .. }));
}

#[tokio::test]
async fn member_management() {
    let h = setup().await;
    let tenant = h.tenant("acme-co").await;

    let member = h
        .members
        .add_member(tenant.id, "u5", h.member_id(), Some("admin-1".into()))
        .await
        .unwrap();
    let err = h
        .members
        .add_member(tenant.id, "u5", h.member_id(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Conflict { .. }));
    let err = h
        .members
        .add_member(Uuid::new_v4(), "u5", h.member_id(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));

    let promoted = h
        .members
        .update_member(member.id, Some(h.admin_id()), None)
        .await
        .unwrap();
    assert_eq!(promoted.role_id, h.admin_id());
    assert_eq!(promoted.status, MemberStatus::Active);

    h.members.remove_member(member.id).await.unwrap();
    assert!(h.members.get_member(tenant.id, "u5").await.is_err());
    assert_eq!(
        h.members
            .list_members(tenant.id, Pagination::default())
            .await
            .unwrap()
            .total,
        1
    );
}

/// Member store whose writes fail; reads go to SurrealDB.
#[derive(Clone)]
struct ReadOnlyMembers(SurrealTenantMemberRepository<Db>);

impl TenantMemberRepository for ReadOnlyMembers {
    async fn create(&self, _input: CreateTenantMember) -> WardenResult<TenantMember> {
        Err(WardenError::Database("write rejected".into()))
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<TenantMember> {
        self.0.get_by_id(id).await
    }

    async fn get_by_tenant_and_user(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> WardenResult<TenantMember> {
        self.0.get_by_tenant_and_user(tenant_id, user_id).await
    }

    async fn update(&self, id: Uuid, input: UpdateTenantMember) -> WardenResult<TenantMember> {
        self.0.update(id, input).await
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        self.0.delete(id).await
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<TenantMember>> {
        self.0.list_by_tenant(tenant_id, pagination).await
    }

    async fn list_by_user(&self, user_id: &str) -> WardenResult<Vec<TenantMember>> {
        self.0.list_by_user(user_id).await
    }

    async fn count_by_role(&self, role_id: Uuid) -> WardenResult<u64> {
        self.0.count_by_role(role_id).await
    }
}

#[tokio::test]
async fn tenant_without_admin_is_abandoned() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();

    let role_repo = SurrealRoleRepository::new(db.clone());
    let member_repo = SurrealTenantMemberRepository::new(db.clone());
    RbacService::new(
        SurrealPermissionRepository::new(db.clone()),
        SurrealPolicyRepository::new(db.clone()),
        role_repo.clone(),
        member_repo.clone(),
    )
    .bootstrap_defaults()
    .await
    .unwrap();

    let dispatcher = RecordingDispatcher::default();
    let tenants = TenantService::new(
        SurrealTenantRepository::new(db.clone()),
        role_repo,
        ReadOnlyMembers(member_repo),
        SurrealInvitationRepository::new(db.clone()),
        dispatcher.clone(),
        InvitationConfig::default(),
    );

    let err = tenants
        .create_tenant(new_tenant("acme-co"))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Database(_)));

    let orphan = tenants.get_tenant_by_slug("acme-co").await.unwrap();
    assert_eq!(orphan.status, TenantStatus::Deleted);
    assert!(tenants.mark_active(orphan.id).await.is_err());
    assert_eq!(dispatcher.count(TaskKind::TenantInitialize), 0);
}
