//! Line and record oriented reads from the client socket.

use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::broadcast;
use tokio::time::timeout;

use super::stream::SmtpStream;
use super::{SmtpError, CONNECTION_TIMEOUT, RECEIVE_BUFFER_LEN, SMTP_DATA_TERMINATOR};

/// What one read produced. Timeouts and shutdown are ordinary outcomes for
/// the session loop, not errors.
#[derive(Debug)]
pub enum ReadOutcome {
    Content(String),
    /// The stop signal fired mid-read.
    Stopped,
    /// No traffic within the inactivity window.
    TimedOut,
    /// The client closed the connection.
    Disconnected,
}

/// Reads commands and message payloads from a connected client.
pub struct Reader {
    stream: ReadHalf<SmtpStream>,
    stop: broadcast::Receiver<()>,
}

impl Reader {
    pub fn new(stream: ReadHalf<SmtpStream>, stop: broadcast::Receiver<()>) -> Self {
        Self { stream, stop }
    }

    /// Accumulates socket reads until the buffer ends with CRLF and returns
    /// the whole chunk. Every call arms a fresh inactivity deadline.
    pub async fn read(&mut self) -> Result<ReadOutcome, SmtpError> {
        let mut accumulated: Vec<u8> = Vec::new();

        loop {
            let mut buffer = [0u8; RECEIVE_BUFFER_LEN];

            tokio::select! {
                _ = self.stop.recv() => return Ok(ReadOutcome::Stopped),

                read = timeout(CONNECTION_TIMEOUT, self.stream.read(&mut buffer)) => {
                    match read {
                        Err(_) => return Ok(ReadOutcome::TimedOut),
                        Ok(Err(e)) => return Err(e.into()),
                        Ok(Ok(0)) => return Ok(ReadOutcome::Disconnected),
                        Ok(Ok(n)) => {
                            accumulated.extend_from_slice(&buffer[..n]);
                            if accumulated.ends_with(b"\r\n") {
                                // Tolerate clients that send broken UTF-8
                                return Ok(ReadOutcome::Content(
                                    String::from_utf8_lossy(&accumulated).into_owned(),
                                ));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Reads the DATA payload: accumulates until the `CRLF.CRLF` terminator
    /// appears, then returns the content with the terminator stripped. The
    /// final line keeps its CRLF so the message text ends with a line break
    /// the way the client wrote it.
    pub async fn read_data_block(&mut self) -> Result<ReadOutcome, SmtpError> {
        let mut accumulated = String::new();

        loop {
            match self.read().await? {
                ReadOutcome::Content(chunk) => {
                    accumulated.push_str(&chunk);

                    // An empty payload arrives as a bare ".\r\n" with no
                    // preceding line to carry the CRLF.
                    if accumulated.starts_with(".\r\n") {
                        return Ok(ReadOutcome::Content(String::new()));
                    }

                    if let Some(position) = accumulated.find(SMTP_DATA_TERMINATOR) {
                        return Ok(ReadOutcome::Content(accumulated[..position + 2].to_string()));
                    }
                }
                other => return Ok(other),
            }
        }
    }
}
