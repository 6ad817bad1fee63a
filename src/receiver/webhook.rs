//! Receiver that announces caught mail to an HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::model::MailItem;
use crate::utils::config::Config;

use super::MailReceiver;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl WebhookConfig {
    /// Reads the `[webhook]` section. Returns `None` when the section is
    /// disabled or the URL is missing.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.get_bool("webhook", "enabled", false) {
            return None;
        }

        let url = match config.get_value("webhook", "url") {
            Some(u) if !u.trim().is_empty() => u.trim().to_string(),
            _ => {
                warn!("webhook.enabled=true but webhook.url is missing");
                return None;
            }
        };

        let timeout_ms = config.get_int("webhook", "timeout_ms", 2000).max(1);
        let token = config
            .get_value("webhook", "token")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Some(Self {
            url,
            token,
            timeout: Duration::from_millis(timeout_ms as u64),
        })
    }
}

/// Payload POSTed for each caught mail. Attachments are announced by count;
/// consumers fetch full content through the query API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent<'a> {
    event: &'static str,
    timestamp: DateTime<Utc>,
    mail_id: Uuid,
    from_address: &'a str,
    to_addresses: &'a [String],
    subject: &'a str,
    attachment_count: usize,
}

pub struct WebhookReceiver {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookReceiver {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MailReceiver for WebhookReceiver {
    async fn receive(&self, mail: &MailItem) -> anyhow::Result<()> {
        let event = WebhookEvent {
            event: "mail.received",
            timestamp: Utc::now(),
            mail_id: mail.id,
            from_address: &mail.from_address,
            to_addresses: &mail.to_addresses,
            subject: &mail.subject,
            attachment_count: mail.attachments.len(),
        };

        let mut request = self
            .client
            .post(&self.config.url)
            .json(&event)
            .timeout(self.config.timeout);

        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            warn!(
                "Webhook POST failed: url={} status={}",
                self.config.url,
                response.status()
            );
            anyhow::bail!("webhook endpoint answered {}", response.status());
        }

        Ok(())
    }
}
