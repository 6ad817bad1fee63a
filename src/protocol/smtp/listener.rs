//! The SMTP listener: accepts connections (plain or TLS) and owns the
//! receiver fan-out loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Mutex, OnceCell};
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::model::MailItem;
use crate::receiver::MailReceiver;

use super::connection::ConnectionManager;
use super::error::SmtpError;
use super::pool::WorkerPool;
use super::stream::{self, SmtpStream};
use super::SmtpConfig;

/// Accepts client connections and hands each to the connection manager.
/// Also drains the mail channel, dispatching every published item to each
/// registered receiver concurrently.
pub struct Listener {
    config: SmtpConfig,
    manager: Arc<ConnectionManager>,
    pool: Arc<WorkerPool>,
    receivers: Vec<Arc<dyn MailReceiver>>,
    mail_rx: Mutex<Option<mpsc::Receiver<MailItem>>>,
    stop: broadcast::Sender<()>,
    bound: OnceCell<SocketAddr>,
}

impl Listener {
    pub fn new(
        config: SmtpConfig,
        manager: Arc<ConnectionManager>,
        pool: Arc<WorkerPool>,
        receivers: Vec<Arc<dyn MailReceiver>>,
        mail_rx: mpsc::Receiver<MailItem>,
        stop: broadcast::Sender<()>,
    ) -> Self {
        Self {
            config,
            manager,
            pool,
            receivers,
            mail_rx: Mutex::new(Some(mail_rx)),
            stop,
            bound: OnceCell::new(),
        }
    }

    /// Binds the socket and serves until shutdown. Always returns
    /// `ServerClosed` once the accept loop ends; failing to bind or to load
    /// the TLS material is fatal and propagated instead.
    pub async fn listen_and_serve(&self) -> Result<(), SmtpError> {
        let tls_acceptor = if self.config.is_ssl() {
            Some(stream::load_tls_acceptor(
                &self.config.certificate_file,
                &self.config.key_file,
            )?)
        } else {
            None
        };

        let listener = TcpListener::bind(self.config.binding_address()).await?;
        let local_addr = listener.local_addr()?;
        let _ = self.bound.set(local_addr);

        if tls_acceptor.is_some() {
            info!("SMTP listener running on SSL {}", local_addr);
        } else {
            info!("SMTP listener running on {}", local_addr);
        }

        let mail_rx = self
            .mail_rx
            .lock()
            .await
            .take()
            .ok_or(SmtpError::ServerClosed)?;

        tokio::spawn(run_receivers(
            mail_rx,
            self.receivers.clone(),
            self.stop.subscribe(),
        ));

        self.accept_connections(listener, tls_acceptor).await;

        Err(SmtpError::ServerClosed)
    }

    async fn accept_connections(
        &self,
        listener: TcpListener,
        tls_acceptor: Option<tokio_rustls::TlsAcceptor>,
    ) {
        let mut stop_rx = self.stop.subscribe();

        loop {
            tokio::select! {
                _ = stop_rx.recv() => return,

                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // An accept failure outside shutdown takes the
                            // whole service down.
                            error!("Problem accepting SMTP requests: {}", e);
                            let _ = self.stop.send(());
                            return;
                        }
                    };

                    let smtp_stream = match &tls_acceptor {
                        Some(acceptor) => match acceptor.accept(socket).await {
                            Ok(tls) => SmtpStream::Tls(tls),
                            Err(e) => {
                                warn!("TLS handshake with {} failed: {}", peer, e);
                                continue;
                            }
                        },
                        None => SmtpStream::Plain(socket),
                    };

                    if let Err(e) = self.manager.register(smtp_stream, peer).await {
                        error!("Error adding connection '{}' to connection manager: {}", peer, e);
                    }
                }
            }
        }
    }

    /// Graceful close: stop accepting immediately, then wait up to the
    /// deadline for every worker to return to the pool.
    pub async fn shutdown(&self, deadline: Duration) {
        let _ = self.stop.send(());

        let expires = Instant::now() + deadline;
        while Instant::now() < expires {
            if self.pool.is_drained() {
                info!("All SMTP workers drained");
                return;
            }
            sleep(Duration::from_millis(25)).await;
        }

        warn!(
            "Shutdown deadline reached with {} worker(s) still busy",
            self.pool.size() - self.pool.idle_workers()
        );
    }

    /// Immediate close with no drain wait.
    pub fn close(&self) {
        let _ = self.stop.send(());
    }

    /// The bound address, available once `listen_and_serve` has opened the
    /// socket. Useful when binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.get().copied()
    }
}

/// Fan-out loop: every mail item goes to every receiver in its own task.
/// Receiver failures are logged and isolated; nothing here pushes back on
/// the workers beyond the bounded mail channel itself.
async fn run_receivers(
    mut mail_rx: mpsc::Receiver<MailItem>,
    receivers: Vec<Arc<dyn MailReceiver>>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    info!("{} receiver(s) listening", receivers.len());

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!("Shutting down receiver channel");
                return;
            }

            item = mail_rx.recv() => {
                let Some(item) = item else { return };
                let shared = Arc::new(item);

                for receiver in &receivers {
                    let receiver = receiver.clone();
                    let mail = shared.clone();

                    tokio::spawn(async move {
                        if let Err(e) = receiver.receive(&mail).await {
                            error!("Receiver failed for mail {}: {}", mail.id, e);
                        }
                    });
                }
            }
        }
    }
}
