//! Warden worker — background task processing entry point.
//!
//! Connects to SurrealDB and Redis, registers the task handlers and runs
//! the worker alongside the expiry scheduler until interrupted.

mod settings;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden_admin::identity::{InMemoryIdentityProvider, SuperTokensIdentityProvider};
use warden_admin::rbac::RbacService;
use warden_admin::system_user::SystemUserService;
use warden_admin::tenant::TenantService;
use warden_core::identity::IdentityProvider;
use warden_db::DbManager;
use warden_db::repository::{
    SurrealInvitationRepository, SurrealPermissionRepository, SurrealPolicyRepository,
    SurrealRoleRepository, SurrealSystemUserRepository, SurrealTenantMemberRepository,
    SurrealTenantRepository,
};
use warden_jobs::{
    ExpirySweepHandler, InvitationEmailHandler, QueueDispatcher, RedisTaskStore, Scheduler,
    TaskStore, TenantInitHandler, Worker, mailer,
};

use crate::settings::{IdentityBackend, LogFormat, LogSettings, Settings};

fn init_tracing(log: &LogSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::var("WARDEN_CONFIG").ok();
    let settings = Settings::load(path.as_deref()).context("failed to load configuration")?;
    init_tracing(&settings.log);

    info!("Starting Warden worker...");

    let db = DbManager::connect(&settings.database)
        .await
        .context("failed to connect to SurrealDB")?;
    let mut store = RedisTaskStore::connect(&settings.redis.url, settings.worker.redis_prefix.clone())
        .await
        .context("failed to connect to Redis")?
        .with_heartbeat_ttl(settings.worker.heartbeat_ttl());
    if let Some(name) = &settings.worker.consumer_name {
        store = store.with_consumer(name.clone());
    }
    info!(consumer = %store.consumer(), "Task store ready");

    match settings.identity.provider {
        IdentityBackend::Memory => {
            warn!("Using the in-memory identity provider; identities do not survive a restart");
            run(settings, db, Arc::new(store), InMemoryIdentityProvider::new()).await
        }
        IdentityBackend::SuperTokens => {
            let identity = SuperTokensIdentityProvider::new(&settings.identity.supertokens)
                .context("failed to configure SuperTokens")?;
            run(settings, db, Arc::new(store), identity).await
        }
    }
}

async fn run<I: IdentityProvider + 'static>(
    settings: Settings,
    db: DbManager,
    store: Arc<dyn TaskStore>,
    identity: I,
) -> anyhow::Result<()> {
    let client = db.client().clone();
    let tenant_repo = SurrealTenantRepository::new(client.clone());
    let role_repo = SurrealRoleRepository::new(client.clone());
    let member_repo = SurrealTenantMemberRepository::new(client.clone());
    let invitation_repo = SurrealInvitationRepository::new(client.clone());
    let system_user_repo = SurrealSystemUserRepository::new(client.clone());
    let dispatcher = QueueDispatcher::new(store.clone());

    RbacService::new(
        SurrealPermissionRepository::new(client.clone()),
        SurrealPolicyRepository::new(client),
        role_repo.clone(),
        member_repo.clone(),
    )
    .bootstrap_defaults()
    .await
    .context("failed to bootstrap system roles")?;

    let tenants = Arc::new(TenantService::new(
        tenant_repo.clone(),
        role_repo,
        member_repo,
        invitation_repo.clone(),
        dispatcher.clone(),
        settings.invitation.clone(),
    ));
    let system_users = Arc::new(SystemUserService::new(
        system_user_repo,
        identity,
        settings.system_users.clone(),
        settings.identity.tenant.clone(),
    ));
    let mail = mailer::from_config(&settings.email)?;

    let mut worker = Worker::new(store, &settings.worker)?;
    worker
        .register(TenantInitHandler::new(tenants, &settings.tenant_init)?)
        .register(InvitationEmailHandler::new(
            invitation_repo.clone(),
            tenant_repo,
            mail,
            settings.invitation.clone(),
            settings.email.from_address.clone(),
        ))
        .register(ExpirySweepHandler::new(system_users, invitation_repo));

    let scheduler = Scheduler::new(dispatcher, settings.worker.expiry_sweep_interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));
    let mut worker_task = tokio::spawn(worker.run(shutdown_rx));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for the shutdown signal")?;
            info!("Shutdown signal received");
        }
        result = &mut worker_task => {
            let _ = shutdown_tx.send(true);
            scheduler_task.await?;
            result??;
            anyhow::bail!("worker stopped unexpectedly");
        }
    }

    let _ = shutdown_tx.send(true);
    worker_task.await??;
    scheduler_task.await?;

    info!("Warden worker stopped.");
    Ok(())
}
