//! Tenant initialisation: notify downstream services, then activate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use warden_admin::tenant::TenantService;
use warden_core::dispatch::{JobDispatcher, TaskKind, TenantInitPayload};
use warden_core::models::tenant::TenantStatus;
use warden_core::repository::{
    InvitationRepository, RoleRepository, TenantMemberRepository, TenantRepository,
};

use super::TaskHandler;
use crate::config::TenantInitConfig;
use crate::error::{JobError, JobResult};
use crate::task::Task;

/// Body posted to `<service>/api/v1/tenants/initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct TenantInitRequest {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub tenant_slug: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct TenantInitHandler<T, R, M, V, D>
where
    T: TenantRepository,
    R: RoleRepository,
    M: TenantMemberRepository,
    V: InvitationRepository,
    D: JobDispatcher,
{
    tenants: Arc<TenantService<T, R, M, V, D>>,
    client: reqwest::Client,
    services: Vec<String>,
}

impl<T, R, M, V, D> TenantInitHandler<T, R, M, V, D>
where
    T: TenantRepository,
    R: RoleRepository,
    M: TenantMemberRepository,
    V: InvitationRepository,
    D: JobDispatcher,
{
    pub fn new(
        tenants: Arc<TenantService<T, R, M, V, D>>,
        config: &TenantInitConfig,
    ) -> JobResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            tenants,
            client,
            services: config
                .services
                .iter()
                .map(|s| s.trim_end_matches('/').to_owned())
                .collect(),
        })
    }

    async fn notify(&self, service: &str, request: &TenantInitRequest) -> JobResult<()> {
        let url = format!("{service}/api/v1/tenants/initialize");
        self.client
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| JobError::Handler(format!("{url}: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl<T, R, M, V, D> TaskHandler for TenantInitHandler<T, R, M, V, D>
where
    T: TenantRepository + 'static,
    R: RoleRepository + 'static,
    M: TenantMemberRepository + 'static,
    V: InvitationRepository + 'static,
    D: JobDispatcher + 'static,
{
    fn kind(&self) -> TaskKind {
        TaskKind::TenantInitialize
    }

    async fn handle(&self, task: &Task) -> JobResult<()> {
        let TenantInitPayload { tenant_id } = task.payload()?;
        let tenant = self.tenants.get_tenant(tenant_id).await?;

        match tenant.status {
            TenantStatus::Pending => {}
            TenantStatus::Active => {
                info!(tenant_id = %tenant_id, "Tenant already active, skipping initialisation");
                return Ok(());
            }
            status => {
                warn!(tenant_id = %tenant_id, status = ?status, "Tenant left pending before initialisation, skipping");
                return Ok(());
            }
        }

        let request = TenantInitRequest {
            tenant_id: tenant.id,
            tenant_name: tenant.name.clone(),
            tenant_slug: tenant.slug.clone(),
            metadata: tenant.metadata.clone(),
            created_at: tenant.created_at,
        };
        for service in &self.services {
            self.notify(service, &request).await?;
            info!(tenant_id = %tenant_id, service = %service, "Service initialised for tenant");
        }

        self.tenants.mark_active(tenant_id).await?;
        info!(tenant_id = %tenant_id, slug = %tenant.slug, "Tenant initialised");
        Ok(())
    }
}
