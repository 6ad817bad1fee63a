//! Per-connection session driver.
//!
//! A worker owns one client connection from greeting to goodbye. Two tasks
//! cooperate over channels: the command reader owns the read half and turns
//! wire traffic into classified events, while the selector loop owns the
//! write half and the in-progress mail item and multiplexes shutdown, reader
//! events, and executor outcomes. The selector hands the reader an explicit
//! directive between events (next command line, or a DATA payload), so the
//! socket always has exactly one reader and responses for one command are on
//! the wire before the next command is pulled off it.
//!
//! Session termination converges on a single exit path: whatever ends the
//! session (QUIT, shutdown, inactivity, socket failure, protocol abuse), the
//! goodbye is said once, the connection is pushed to the close channel once,
//! and the worker rejoins the pool queue once.

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::model::MailItem;
use crate::sanitize::StringSanitizer;

use super::command::Command;
use super::error::SmtpError;
use super::executor;
use super::reader::{ReadOutcome, Reader};
use super::writer::Writer;
use super::COMMAND_TIMEOUT;

/// Lifecycle of a worker. Idle workers sit in the pool queue; a prepared
/// worker is Working until its session ends in Done or Error, and rejoining
/// the queue makes it Idle again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Working,
    Done,
    Error,
}

/// What the selector wants read next.
enum ReaderDirective {
    NextCommand,
    DataBlock,
}

/// Classified traffic and session-ending conditions, as seen by the selector.
enum SessionEvent {
    Command { command: Command, input: String },
    DataBlock(String),
    Quit,
    Stopped,
    TimedOut,
    Disconnected,
    Failed(SmtpError),
}

/// Everything a worker needs to run one connection. Built by the connection
/// manager when a worker is taken from the pool.
pub struct Session {
    pub reader: Reader,
    pub writer: Writer,
    pub peer: SocketAddr,
    pub mail_tx: mpsc::Sender<MailItem>,
    pub stop: broadcast::Receiver<()>,
    pub close_tx: mpsc::Sender<SocketAddr>,
}

pub struct Worker {
    pub id: usize,
    pub state: WorkerState,
    sanitizer: Arc<dyn StringSanitizer>,
    rejoin: mpsc::Sender<Worker>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        sanitizer: Arc<dyn StringSanitizer>,
        rejoin: mpsc::Sender<Worker>,
    ) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            sanitizer,
            rejoin,
        }
    }

    /// Drives the SMTP dialogue for one connection, then returns the slot to
    /// the pool.
    pub async fn work(mut self, session: Session) {
        self.state = WorkerState::Working;

        let Session {
            reader,
            mut writer,
            peer,
            mail_tx,
            mut stop,
            close_tx,
        } = session;

        let (directive_tx, directive_rx) = mpsc::channel::<ReaderDirective>(1);
        let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(1);
        let reader_task = tokio::spawn(run_command_reader(reader, directive_rx, event_tx));

        let outcome = self
            .run_selector(&mut writer, peer, &mail_tx, &mut stop, &directive_tx, &mut event_rx)
            .await;

        self.state = outcome;
        let _ = writer.say_goodbye().await;

        // The reaper is gone once the stop signal fires; never block the
        // slot on handing over the close event.
        let _ = close_tx.try_send(peer);

        reader_task.abort();
        self.rejoin_worker_queue().await;
    }

    async fn run_selector(
        &self,
        writer: &mut Writer,
        peer: SocketAddr,
        mail_tx: &mpsc::Sender<MailItem>,
        stop: &mut broadcast::Receiver<()>,
        directive_tx: &mpsc::Sender<ReaderDirective>,
        event_rx: &mut mpsc::Receiver<SessionEvent>,
    ) -> WorkerState {
        if writer.say_hello().await.is_err() {
            return WorkerState::Error;
        }

        let mut mail = MailItem::empty();

        if directive_tx.send(ReaderDirective::NextCommand).await.is_err() {
            return WorkerState::Error;
        }

        loop {
            let event = tokio::select! {
                _ = stop.recv() => return WorkerState::Done,
                event = event_rx.recv() => match event {
                    Some(event) => event,
                    None => return WorkerState::Error,
                },
            };

            match event {
                SessionEvent::Quit => {
                    info!(%peer, "QUIT command received");
                    return WorkerState::Done;
                }
                SessionEvent::Stopped => return WorkerState::Done,
                SessionEvent::TimedOut => {
                    info!(%peer, "Connection inactivity timeout");
                    return WorkerState::Done;
                }
                SessionEvent::Disconnected => {
                    debug!(%peer, "Client closed the connection");
                    return WorkerState::Done;
                }
                SessionEvent::Failed(e) => {
                    error!(%peer, "Problem reading command from client: {}", e);
                    return WorkerState::Error;
                }
                SessionEvent::DataBlock(_) => {
                    // A payload with no DATA command in flight
                    return WorkerState::Error;
                }
                SessionEvent::Command {
                    command: Command::Data,
                    ..
                } => {
                    match self
                        .handle_data(writer, mail_tx, directive_tx, event_rx, &mut mail)
                        .await
                    {
                        ControlFlow::Continue(()) => {}
                        ControlFlow::Break(state) => return state,
                    }
                }
                SessionEvent::Command { command, input } => {
                    let input = input.trim();
                    let executed = timeout(
                        COMMAND_TIMEOUT,
                        executor::execute(command, input, &mut mail, writer, self.sanitizer.as_ref()),
                    )
                    .await;

                    match executed {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) if e.is_terminal() => {
                            error!(%peer, %command, input, "Problem executing command: {}", e);
                            return WorkerState::Error;
                        }
                        Ok(Err(e)) => {
                            warn!(%peer, %command, "Command rejected: {}", e);
                            if writer.send_transaction_failed().await.is_err() {
                                return WorkerState::Error;
                            }
                        }
                        Err(_) => {
                            error!(%peer, %command, "Command execution timed out");
                            return WorkerState::Error;
                        }
                    }
                }
            }

            if directive_tx.send(ReaderDirective::NextCommand).await.is_err() {
                return WorkerState::Error;
            }
        }
    }

    /// DATA is the one command that changes the wire protocol: prompt with
    /// 354, have the reader pull the payload, assemble the mail, publish a
    /// snapshot, and start a fresh transaction. Assembly failures answer 554
    /// and leave the session usable.
    async fn handle_data(
        &self,
        writer: &mut Writer,
        mail_tx: &mpsc::Sender<MailItem>,
        directive_tx: &mpsc::Sender<ReaderDirective>,
        event_rx: &mut mpsc::Receiver<SessionEvent>,
        mail: &mut MailItem,
    ) -> ControlFlow<WorkerState> {
        if writer.send_data_response().await.is_err() {
            return ControlFlow::Break(WorkerState::Error);
        }

        if directive_tx.send(ReaderDirective::DataBlock).await.is_err() {
            return ControlFlow::Break(WorkerState::Error);
        }

        let block = match event_rx.recv().await {
            Some(SessionEvent::DataBlock(block)) => block,
            // Shutdown or inactivity mid-DATA ends the session cleanly with
            // no partial mail emitted.
            Some(SessionEvent::Stopped)
            | Some(SessionEvent::TimedOut)
            | Some(SessionEvent::Disconnected) => return ControlFlow::Break(WorkerState::Done),
            _ => return ControlFlow::Break(WorkerState::Error),
        };

        let executed = timeout(
            COMMAND_TIMEOUT,
            executor::execute_data(&block, mail, writer, self.sanitizer.as_ref()),
        )
        .await;

        match executed {
            Ok(Ok(())) => {
                // Publish a snapshot; the send blocks when receivers are
                // saturated, which is the backpressure surface.
                let snapshot = mail.clone();
                if mail_tx.send(snapshot).await.is_err() {
                    warn!("Mail channel closed, message dropped");
                }

                *mail = MailItem::empty();
                ControlFlow::Continue(())
            }
            Ok(Err(e)) if e.is_terminal() => {
                error!("Problem processing DATA block: {}", e);
                ControlFlow::Break(WorkerState::Error)
            }
            Ok(Err(e)) => {
                warn!("Problem parsing message contents: {}", e);
                if writer.send_transaction_failed().await.is_err() {
                    return ControlFlow::Break(WorkerState::Error);
                }
                ControlFlow::Continue(())
            }
            Err(_) => {
                error!("DATA processing timed out");
                ControlFlow::Break(WorkerState::Error)
            }
        }
    }

    async fn rejoin_worker_queue(mut self) {
        self.state = WorkerState::Idle;
        let queue = self.rejoin.clone();
        let _ = queue.send(self).await;
    }
}

/// The command reader task. Waits for a directive, reads accordingly, and
/// reports one event back. Session-ending outcomes also end this task; the
/// selector aborts it as a backstop when the session closes for other
/// reasons.
async fn run_command_reader(
    mut reader: Reader,
    mut directive_rx: mpsc::Receiver<ReaderDirective>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    while let Some(directive) = directive_rx.recv().await {
        let event = match directive {
            ReaderDirective::NextCommand => next_command(&mut reader).await,
            ReaderDirective::DataBlock => match reader.read_data_block().await {
                Ok(ReadOutcome::Content(block)) => SessionEvent::DataBlock(block),
                Ok(ReadOutcome::Stopped) => SessionEvent::Stopped,
                Ok(ReadOutcome::TimedOut) => SessionEvent::TimedOut,
                Ok(ReadOutcome::Disconnected) => SessionEvent::Disconnected,
                Err(e) => SessionEvent::Failed(e),
            },
        };

        let session_over = !matches!(
            event,
            SessionEvent::Command { .. } | SessionEvent::DataBlock(_)
        );

        if event_tx.send(event).await.is_err() || session_over {
            return;
        }
    }
}

/// Reads and classifies the next command line, skipping blank lines.
async fn next_command(reader: &mut Reader) -> SessionEvent {
    loop {
        match reader.read().await {
            Ok(ReadOutcome::Content(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match Command::classify(trimmed) {
                    Ok(Command::Quit) => return SessionEvent::Quit,
                    Ok(command) => {
                        return SessionEvent::Command {
                            command,
                            input: trimmed.to_string(),
                        }
                    }
                    Err(e) => {
                        warn!(input = trimmed, "Problem finding command from input");
                        return SessionEvent::Failed(e);
                    }
                }
            }
            Ok(ReadOutcome::Stopped) => return SessionEvent::Stopped,
            Ok(ReadOutcome::TimedOut) => return SessionEvent::TimedOut,
            Ok(ReadOutcome::Disconnected) => return SessionEvent::Disconnected,
            Err(e) => return SessionEvent::Failed(e),
        }
    }
}
