//! Invitation email delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use warden_admin::config::InvitationConfig;
use warden_core::dispatch::{InvitationEmailPayload, TaskKind};
use warden_core::models::invitation::UserInvitation;
use warden_core::models::tenant::Tenant;
use warden_core::repository::{InvitationRepository, TenantRepository};

use super::TaskHandler;
use crate::error::JobResult;
use crate::mailer::{EmailMessage, Mailer};
use crate::task::Task;

/// Build the invitation email for `invitation` into `tenant`.
pub fn render_invitation(
    invitation: &UserInvitation,
    tenant: &Tenant,
    config: &InvitationConfig,
    from: &str,
) -> EmailMessage {
    let link = format!("{}?token={}", config.base_url, invitation.token);
    let body = format!(
        "You have been invited to join {tenant} on Warden.\n\n\
         Accept the invitation here:\n{link}\n\n\
         This link expires on {expires}.\n",
        tenant = tenant.name,
        expires = invitation.expires_at.format("%Y-%m-%d %H:%M UTC"),
    );
    EmailMessage {
        from: from.to_owned(),
        to: invitation.email.clone(),
        subject: format!("You've been invited to join {}", tenant.name),
        body,
    }
}

pub struct InvitationEmailHandler<V: InvitationRepository, T: TenantRepository> {
    invitations: V,
    tenants: T,
    mailer: Arc<dyn Mailer>,
    config: InvitationConfig,
    from_address: String,
}

impl<V: InvitationRepository, T: TenantRepository> InvitationEmailHandler<V, T> {
    pub fn new(
        invitations: V,
        tenants: T,
        mailer: Arc<dyn Mailer>,
        config: InvitationConfig,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            invitations,
            tenants,
            mailer,
            config,
            from_address: from_address.into(),
        }
    }
}

#[async_trait]
impl<V, T> TaskHandler for InvitationEmailHandler<V, T>
where
    V: InvitationRepository + 'static,
    T: TenantRepository + 'static,
{
    fn kind(&self) -> TaskKind {
        TaskKind::InvitationEmail
    }

    async fn handle(&self, task: &Task) -> JobResult<()> {
        let InvitationEmailPayload { invitation_id } = task.payload()?;
        let invitation = self.invitations.get_by_id(invitation_id).await?;

        // Accepted or cancelled before the email went out.
        if !invitation.can_accept() {
            info!(
                invitation_id = %invitation_id,
                status = ?invitation.status,
                "Invitation no longer acceptable, email skipped"
            );
            return Ok(());
        }

        let tenant = self.tenants.get_by_id(invitation.tenant_id).await?;
        let message = render_invitation(&invitation, &tenant, &self.config, &self.from_address);
        self.mailer.send(&message).await?;

        info!(
            invitation_id = %invitation_id,
            tenant_id = %tenant.id,
            "Invitation email sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use warden_core::models::invitation::InvitationStatus;
    use warden_core::models::tenant::TenantStatus;

    use super::*;

    #[test]
    fn email_carries_accept_link() {
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Acme Co".into(),
            slug: "acme-co".into(),
            status: TenantStatus::Active,
            metadata: serde_json::json!({}),
            created_by: "user-1".into(),
            created_at: now,
            updated_at: now,
        };
        let invitation = UserInvitation {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            email: "bob@example.com".into(),
            invited_by: "user-1".into(),
            role_id: Uuid::new_v4(),
            token: "abc123".into(),
            status: InvitationStatus::Pending,
            expires_at: now + Duration::hours(72),
            accepted_at: None,
            created_at: now,
            updated_at: now,
        };
        let config = InvitationConfig {
            expiry_hours: 72,
            base_url: "https://app.example.com/accept".into(),
        };

        let message = render_invitation(&invitation, &tenant, &config, "noreply@example.com");
        assert_eq!(message.to, "bob@example.com");
        assert_eq!(message.from, "noreply@example.com");
        assert_eq!(message.subject, "You've been invited to join Acme Co");
        assert!(message.body.contains("https://app.example.com/accept?token=abc123"));
    }
}
