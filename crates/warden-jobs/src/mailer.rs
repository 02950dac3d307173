//! Outgoing email.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use crate::config::EmailConfig;
use crate::error::{JobError, JobResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> JobResult<()>;
}

/// Writes every message to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> JobResult<()> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Email (log provider)"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> JobResult<()> {
        self.sent
            .lock()
            .map_err(|_| JobError::Handler("recording mailer poisoned".into()))?
            .push(message.clone());
        Ok(())
    }
}

/// Build the mailer named by `config.provider`.
pub fn from_config(config: &EmailConfig) -> JobResult<Arc<dyn Mailer>> {
    match config.provider.as_str() {
        "log" => Ok(Arc::new(LogMailer)),
        other => Err(JobError::Config(format!("unknown email provider {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_log_provider_is_built_in() {
        assert!(from_config(&EmailConfig::default()).is_ok());
        let smtp = EmailConfig {
            provider: "smtp".into(),
            ..Default::default()
        };
        assert!(matches!(from_config(&smtp), Err(JobError::Config(_))));
    }
}
