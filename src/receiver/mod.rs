pub mod database;
pub mod log;
pub mod webhook;

pub use database::{DatabaseReceiver, MailWriter};
pub use log::LogReceiver;
pub use webhook::{WebhookConfig, WebhookReceiver};

use async_trait::async_trait;

use crate::model::MailItem;

/// A consumer of assembled mail items.
///
/// Every receiver registered at service start is handed each mail item in
/// its own task; fan-out is concurrent and best-effort, and a failing
/// receiver never affects the others or the producing session.
#[async_trait]
pub trait MailReceiver: Send + Sync {
    async fn receive(&self, mail: &MailItem) -> anyhow::Result<()>;
}
