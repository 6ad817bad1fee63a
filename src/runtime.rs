//! Service composition: wires configuration, sanitizer, and receivers into
//! the running SMTP service.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::protocol::smtp::{SmtpConfig, SmtpError, SmtpService};
use crate::receiver::{LogReceiver, MailReceiver, WebhookConfig, WebhookReceiver};
use crate::sanitize::{StringSanitizer, XssSanitizer};
use crate::utils::config::Config;

pub struct Runtime {
    pub config: Arc<Config>,
    smtp: OnceCell<Arc<SmtpService>>,
}

impl Runtime {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            smtp: OnceCell::const_new(),
        }
    }

    /// Builds the receiver set from configuration. The log receiver is
    /// always on; a webhook receiver joins it when `[webhook]` is enabled.
    /// Embedders that persist mail register their own receiver through
    /// [`Runtime::run_with_receivers`].
    fn default_receivers(&self) -> Vec<Arc<dyn MailReceiver>> {
        let mut receivers: Vec<Arc<dyn MailReceiver>> = vec![Arc::new(LogReceiver)];

        if let Some(webhook) = WebhookConfig::from_config(&self.config) {
            info!("Webhook receiver enabled: {}", webhook.url);
            receivers.push(Arc::new(WebhookReceiver::new(webhook)));
        }

        receivers
    }

    pub async fn run(
        &self,
        tasks: &mut Vec<tokio::task::JoinHandle<()>>,
    ) -> anyhow::Result<()> {
        let receivers = self.default_receivers();
        self.run_with_receivers(tasks, receivers).await
    }

    /// Starts the SMTP service with the given receiver set.
    pub async fn run_with_receivers(
        &self,
        tasks: &mut Vec<tokio::task::JoinHandle<()>>,
        receivers: Vec<Arc<dyn MailReceiver>>,
    ) -> anyhow::Result<()> {
        let sanitizer: Arc<dyn StringSanitizer> = Arc::new(XssSanitizer);
        let smtp_config = SmtpConfig::from_config(&self.config);

        let service = Arc::new(SmtpService::new(smtp_config, sanitizer, receivers));
        self.smtp
            .set(service.clone())
            .map_err(|_| anyhow::anyhow!("SMTP service already running"))?;

        tasks.push(tokio::spawn(async move {
            match service.start().await {
                Err(SmtpError::ServerClosed) => info!("SMTP server closed"),
                Err(e) => error!("SMTP server failed: {}", e),
                Ok(()) => {}
            }
        }));

        Ok(())
    }

    /// Graceful stop: no new accepts, in-flight sessions drain up to the
    /// deadline.
    pub async fn shutdown(&self, deadline: Duration) {
        if let Some(service) = self.smtp.get() {
            service.shutdown(deadline).await;
        }
    }

    pub fn smtp(&self) -> Option<&Arc<SmtpService>> {
        self.smtp.get()
    }
}
