//! Receiver that records a one-line summary of each mail.

use async_trait::async_trait;
use tracing::info;

use crate::model::MailItem;

use super::MailReceiver;

/// Always-on receiver for development: every caught mail shows up in the
/// service log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReceiver;

#[async_trait]
impl MailReceiver for LogReceiver {
    async fn receive(&self, mail: &MailItem) -> anyhow::Result<()> {
        info!(
            id = %mail.id,
            from = %mail.from_address,
            to = %mail.to_addresses.join(", "),
            subject = %mail.subject,
            attachments = mail.attachments.len(),
            "Mail received"
        );

        Ok(())
    }
}
