//! SMTP reception core: listener, connection manager, worker pool, and the
//! per-connection command state machine.

pub mod address;
pub mod command;
pub mod connection;
pub mod error;
pub mod executor;
pub mod listener;
pub mod pool;
pub mod reader;
pub mod stream;
pub mod worker;
pub mod writer;

pub use command::Command;
pub use connection::ConnectionManager;
pub use error::SmtpError;
pub use listener::Listener;
pub use pool::WorkerPool;
pub use worker::{Worker, WorkerState};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::model::MailItem;
use crate::receiver::MailReceiver;
use crate::sanitize::StringSanitizer;
use crate::utils::config::Config;

// Responses sent to SMTP clients.
pub const SMTP_CRLF: &str = "\r\n";
pub const SMTP_DATA_TERMINATOR: &str = "\r\n.\r\n";
pub const SMTP_WELCOME_MESSAGE: &str = "220 Welcome to MailSlurper!";
pub const SMTP_CLOSING_MESSAGE: &str = "221 Bye";
pub const SMTP_OK_MESSAGE: &str = "250 Ok";
pub const SMTP_HELLO_RESPONSE_MESSAGE: &str = "250 Hello. How very nice to meet you!";
pub const SMTP_DATA_RESPONSE_MESSAGE: &str = "354 End data with <CR><LF>.<CR><LF>";
pub const SMTP_ERROR_TRANSACTION_FAILED: &str = "554 Transaction failed";

pub(crate) const RECEIVE_BUFFER_LEN: usize = 1024;

/// Inactivity window on client reads.
pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Deadline for executing one command end to end.
pub(crate) const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-response write deadline.
pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// How long a new connection waits for a pool slot.
pub(crate) const WORKER_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);
/// Cool-down before a panicked worker slot rejoins the pool.
pub(crate) const WORKER_RESTART_COOLDOWN: Duration = Duration::from_secs(5);

/// Buffered mail items between workers and the receiver fan-out; when full,
/// publishing workers block.
pub(crate) const MAIL_CHANNEL_CAPACITY: usize = 1000;
pub(crate) const CLOSE_CHANNEL_CAPACITY: usize = 5;

pub(crate) const DEFAULT_MAX_WORKERS: usize = 5;

/// Listener settings from the `[smtp]` config section.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub address: String,
    pub port: u16,
    pub certificate_file: String,
    pub key_file: String,
    pub max_workers: usize,
}

impl SmtpConfig {
    pub fn from_config(config: &Config) -> Self {
        let address = config
            .get_value("smtp", "address")
            .unwrap_or("127.0.0.1")
            .to_string();

        let port = config.get_int("smtp", "port", 2500).clamp(0, u16::MAX as i32) as u16;

        let certificate_file = config
            .get_value("smtp", "certificate_file")
            .unwrap_or("")
            .to_string();
        let key_file = config.get_value("smtp", "key_file").unwrap_or("").to_string();

        let max_workers =
            config.get_int("smtp", "max_workers", DEFAULT_MAX_WORKERS as i32).max(1) as usize;

        Self {
            address,
            port,
            certificate_file,
            key_file,
            max_workers,
        }
    }

    pub fn binding_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// TLS is used only when both halves of the key pair are configured.
    pub fn is_ssl(&self) -> bool {
        !self.certificate_file.is_empty() && !self.key_file.is_empty()
    }
}

/// The assembled SMTP service: channels, pool, connection manager, and
/// listener wired together, with receivers registered at construction.
pub struct SmtpService {
    listener: Arc<Listener>,
}

impl SmtpService {
    pub fn new(
        config: SmtpConfig,
        sanitizer: Arc<dyn StringSanitizer>,
        receivers: Vec<Arc<dyn MailReceiver>>,
    ) -> Self {
        let (mail_tx, mail_rx) = mpsc::channel::<MailItem>(MAIL_CHANNEL_CAPACITY);
        let (stop_tx, _) = broadcast::channel(1);

        let pool = Arc::new(WorkerPool::new(config.max_workers, sanitizer.clone()));
        let manager = ConnectionManager::new(pool.clone(), mail_tx, stop_tx.clone(), sanitizer);

        let listener = Arc::new(Listener::new(
            config,
            manager,
            pool,
            receivers,
            mail_rx,
            stop_tx,
        ));

        Self { listener }
    }

    /// Serves until shutdown; see [`Listener::listen_and_serve`].
    pub async fn start(&self) -> Result<(), SmtpError> {
        self.listener.listen_and_serve().await
    }

    pub async fn shutdown(&self, deadline: Duration) {
        self.listener.shutdown(deadline).await;
    }

    pub fn close(&self) {
        self.listener.close();
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_config_defaults() {
        let config = Config::new();
        let smtp = SmtpConfig::from_config(&config);

        assert_eq!(smtp.address, "127.0.0.1");
        assert_eq!(smtp.port, 2500);
        assert_eq!(smtp.max_workers, 5);
        assert!(!smtp.is_ssl());
    }

    #[test]
    fn max_workers_has_a_floor_of_one() {
        let mut config = Config::new();
        config.set_value("smtp", "max_workers", "0").unwrap();

        let smtp = SmtpConfig::from_config(&config);
        assert_eq!(smtp.max_workers, 1);
    }

    #[test]
    fn tls_requires_both_files() {
        let mut config = Config::new();
        config
            .set_value("smtp", "certificate_file", "/tmp/cert.pem")
            .unwrap();

        let smtp = SmtpConfig::from_config(&config);
        assert!(!smtp.is_ssl());
    }
}
