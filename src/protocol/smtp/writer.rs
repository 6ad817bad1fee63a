//! Response emission toward the client.

use std::io;

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::time::timeout;

use super::stream::SmtpStream;
use super::{
    SmtpError, SMTP_CLOSING_MESSAGE, SMTP_CRLF, SMTP_DATA_RESPONSE_MESSAGE,
    SMTP_ERROR_TRANSACTION_FAILED, SMTP_HELLO_RESPONSE_MESSAGE, SMTP_OK_MESSAGE,
    SMTP_WELCOME_MESSAGE, WRITE_TIMEOUT,
};

/// Writes protocol responses, each under its own write deadline.
pub struct Writer {
    stream: WriteHalf<SmtpStream>,
}

impl Writer {
    pub fn new(stream: WriteHalf<SmtpStream>) -> Self {
        Self { stream }
    }

    pub async fn send_response(&mut self, response: &str) -> Result<(), SmtpError> {
        let payload = format!("{response}{SMTP_CRLF}");

        let write = async {
            self.stream.write_all(payload.as_bytes()).await?;
            self.stream.flush().await
        };

        match timeout(WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(SmtpError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "write deadline exceeded",
            ))),
        }
    }

    pub async fn say_hello(&mut self) -> Result<(), SmtpError> {
        self.send_response(SMTP_WELCOME_MESSAGE).await
    }

    pub async fn say_goodbye(&mut self) -> Result<(), SmtpError> {
        self.send_response(SMTP_CLOSING_MESSAGE).await
    }

    pub async fn send_ok(&mut self) -> Result<(), SmtpError> {
        self.send_response(SMTP_OK_MESSAGE).await
    }

    pub async fn send_helo_response(&mut self) -> Result<(), SmtpError> {
        self.send_response(SMTP_HELLO_RESPONSE_MESSAGE).await
    }

    pub async fn send_data_response(&mut self) -> Result<(), SmtpError> {
        self.send_response(SMTP_DATA_RESPONSE_MESSAGE).await
    }

    pub async fn send_transaction_failed(&mut self) -> Result<(), SmtpError> {
        self.send_response(SMTP_ERROR_TRANSACTION_FAILED).await
    }
}
