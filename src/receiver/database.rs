//! Persistence receiver: bridges mail items to a storage backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::model::MailItem;

use super::MailReceiver;

/// Capability implemented by storage backends. An error means durability
/// was not achieved for this message; the sink logs it and moves on.
#[async_trait]
pub trait MailWriter: Send + Sync {
    async fn store(&self, mail: &MailItem) -> anyhow::Result<()>;
}

/// Receiver that writes every mail item through a [`MailWriter`].
pub struct DatabaseReceiver {
    writer: Arc<dyn MailWriter>,
}

impl DatabaseReceiver {
    pub fn new(writer: Arc<dyn MailWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl MailReceiver for DatabaseReceiver {
    async fn receive(&self, mail: &MailItem) -> anyhow::Result<()> {
        if let Err(e) = self.writer.store(mail).await {
            error!("There was an error while storing mail item {}: {}", mail.id, e);
            return Err(e);
        }

        info!("Mail item {} written", mail.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter {
        stored: Mutex<Vec<uuid::Uuid>>,
        fail: bool,
    }

    #[async_trait]
    impl MailWriter for RecordingWriter {
        async fn store(&self, mail: &MailItem) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            self.stored.lock().unwrap().push(mail.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stores_through_the_writer() {
        let writer = Arc::new(RecordingWriter::default());
        let receiver = DatabaseReceiver::new(writer.clone());
        let mail = MailItem::empty();

        receiver.receive(&mail).await.unwrap();

        assert_eq!(*writer.stored.lock().unwrap(), vec![mail.id]);
    }

    #[tokio::test]
    async fn surfaces_writer_errors() {
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..Default::default()
        });
        let receiver = DatabaseReceiver::new(writer);

        assert!(receiver.receive(&MailItem::empty()).await.is_err());
    }
}
