//! Connection bookkeeping: one live entry per remote address, each bound to
//! the worker driving it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

use crate::model::MailItem;
use crate::sanitize::StringSanitizer;

use super::error::SmtpError;
use super::pool::WorkerPool;
use super::reader::Reader;
use super::stream::SmtpStream;
use super::worker::{Session, Worker};
use super::writer::Writer;
use super::{CLOSE_CHANNEL_CAPACITY, WORKER_RESTART_COOLDOWN};

/// Tracks live client connections keyed by remote address, pairs each with a
/// worker from the pool, and reaps entries as sessions push their addresses
/// onto the close channel.
pub struct ConnectionManager {
    connections: Mutex<HashMap<String, usize>>,
    pool: Arc<WorkerPool>,
    mail_tx: mpsc::Sender<MailItem>,
    close_tx: mpsc::Sender<SocketAddr>,
    stop: broadcast::Sender<()>,
    sanitizer: Arc<dyn StringSanitizer>,
}

impl ConnectionManager {
    /// Creates the manager and starts its close reaper, which runs until the
    /// service-wide stop signal fires.
    pub fn new(
        pool: Arc<WorkerPool>,
        mail_tx: mpsc::Sender<MailItem>,
        stop: broadcast::Sender<()>,
        sanitizer: Arc<dyn StringSanitizer>,
    ) -> Arc<Self> {
        let (close_tx, close_rx) = mpsc::channel(CLOSE_CHANNEL_CAPACITY);

        let manager = Arc::new(Self {
            connections: Mutex::new(HashMap::new()),
            pool,
            mail_tx,
            close_tx,
            stop: stop.clone(),
            sanitizer,
        });

        tokio::spawn(run_close_reaper(
            manager.clone(),
            close_rx,
            stop.subscribe(),
        ));

        manager
    }

    /// Tracks a newly accepted connection and starts a worker on it.
    ///
    /// Fails with `ConnectionExists` when the remote address is already
    /// live; on worker exhaustion the socket is dropped (closing it) and the
    /// error surfaces to the accept loop.
    pub async fn register(&self, stream: SmtpStream, peer: SocketAddr) -> Result<(), SmtpError> {
        let key = peer.to_string();

        if self.connections.lock().await.contains_key(&key) {
            return Err(SmtpError::ConnectionExists(key));
        }

        let worker = match self.pool.next_worker().await {
            Ok(worker) => worker,
            Err(e) => {
                error!("Error getting next SMTP worker: {}", e);
                drop(stream);
                return Err(e);
            }
        };

        self.connections.lock().await.insert(key, worker.id);
        info!("Worker {} handling connection from {}", worker.id, peer);

        let (read_half, write_half) = tokio::io::split(stream);
        let session = Session {
            reader: Reader::new(read_half, self.stop.subscribe()),
            writer: Writer::new(write_half),
            peer,
            mail_tx: self.mail_tx.clone(),
            stop: self.stop.subscribe(),
            close_tx: self.close_tx.clone(),
        };

        self.spawn_worker(worker, session, peer);
        Ok(())
    }

    /// Removes a connection from the pool map. Idempotent in effect: a
    /// second release reports `ConnectionNotExists`, which the reaper logs
    /// and ignores. The socket itself closes when the worker drops its
    /// halves.
    pub async fn release(&self, address: &str) -> Result<(), SmtpError> {
        match self.connections.lock().await.remove(address) {
            Some(_) => Ok(()),
            None => Err(SmtpError::ConnectionNotExists(address.to_string())),
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Runs the worker under a monitor. A panicking worker would leak its
    /// pool slot and its connection entry, so the monitor pushes the close
    /// event itself and rebuilds the slot after a cool-down.
    fn spawn_worker(&self, worker: Worker, session: Session, peer: SocketAddr) {
        let id = worker.id;
        let queue = self.pool.queue_sender();
        let sanitizer = self.sanitizer.clone();
        let close_tx = self.close_tx.clone();

        let handle = tokio::spawn(worker.work(session));

        tokio::spawn(async move {
            if let Err(join_error) = handle.await {
                if join_error.is_panic() {
                    error!("SMTP worker {} panicked, restarting after cool-down", id);
                    let _ = close_tx.try_send(peer);

                    tokio::time::sleep(WORKER_RESTART_COOLDOWN).await;
                    let replacement = Worker::new(id, sanitizer, queue.clone());
                    let _ = queue.send(replacement).await;
                }
            }
        });
    }
}

/// Consumes the close channel until the stop signal fires.
async fn run_close_reaper(
    manager: Arc<ConnectionManager>,
    mut close_rx: mpsc::Receiver<SocketAddr>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = stop_rx.recv() => return,

            closed = close_rx.recv() => {
                let Some(peer) = closed else { return };

                match manager.release(&peer.to_string()).await {
                    Ok(()) => info!("Connection {} closed", peer),
                    Err(e) => warn!("Error closing connection: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::XssSanitizer;

    fn manager() -> Arc<ConnectionManager> {
        let sanitizer: Arc<dyn StringSanitizer> = Arc::new(XssSanitizer);
        let pool = Arc::new(WorkerPool::new(2, sanitizer.clone()));
        let (mail_tx, _mail_rx) = mpsc::channel(10);
        let (stop_tx, _) = broadcast::channel(1);
        ConnectionManager::new(pool, mail_tx, stop_tx, sanitizer)
    }

    #[tokio::test]
    async fn release_of_unknown_address_errors() {
        let manager = manager();
        let result = manager.release("203.0.113.9:4242").await;
        assert!(matches!(result, Err(SmtpError::ConnectionNotExists(_))));
    }
}
