//! Fixed-size pool of SMTP workers.
//!
//! The pool is a bounded queue holding idle workers. Exactly `max_workers`
//! workers exist for the pool's lifetime: the queue length plus the number
//! of workers out on connections always equals the pool size.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::info;

use crate::sanitize::StringSanitizer;

use super::error::SmtpError;
use super::worker::Worker;
use super::WORKER_ACQUIRE_TIMEOUT;

pub struct WorkerPool {
    queue_tx: mpsc::Sender<Worker>,
    queue_rx: Mutex<mpsc::Receiver<Worker>>,
    size: usize,
}

impl WorkerPool {
    /// Builds the pool and seeds the queue with every worker. Sizes below
    /// one are clamped up.
    pub fn new(max_workers: usize, sanitizer: Arc<dyn StringSanitizer>) -> Self {
        let size = max_workers.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(size);

        for id in 1..=size {
            let worker = Worker::new(id, sanitizer.clone(), queue_tx.clone());
            queue_tx
                .try_send(worker)
                .expect("worker queue is sized to hold every worker");
        }

        info!("Worker pool configured, workers: {}", size);

        Self {
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            size,
        }
    }

    /// Takes the next idle worker, waiting up to the acquire deadline.
    pub async fn next_worker(&self) -> Result<Worker, SmtpError> {
        let mut queue = self.queue_rx.lock().await;

        match timeout(WORKER_ACQUIRE_TIMEOUT, queue.recv()).await {
            Ok(Some(worker)) => Ok(worker),
            Ok(None) | Err(_) => Err(SmtpError::NoWorkerAvailable),
        }
    }

    /// Sender used by workers (and the panic monitor) to return slots to the
    /// queue.
    pub fn queue_sender(&self) -> mpsc::Sender<Worker> {
        self.queue_tx.clone()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of workers currently sitting in the queue.
    pub fn idle_workers(&self) -> usize {
        self.size - self.queue_tx.capacity()
    }

    /// True when every worker is back in the queue.
    pub fn is_drained(&self) -> bool {
        self.idle_workers() == self.size
    }
}
