use thiserror::Error;

use crate::mime::MimeError;

/// Everything that can go wrong between accepting a socket and publishing a
/// mail item.
#[derive(Debug, Error)]
pub enum SmtpError {
    /// Expected sentinel returned by `listen_and_serve` after shutdown.
    #[error("server closed")]
    ServerClosed,

    #[error("connection on '{0}' already exists")]
    ConnectionExists(String),

    #[error("connection '{0}' is not in the connection manager pool")]
    ConnectionNotExists(String),

    #[error("no worker available, timeout has been exceeded")]
    NoWorkerAvailable,

    #[error("invalid command {0}")]
    InvalidCommand(String),

    #[error("{0} command format is invalid")]
    InvalidCommandFormat(String),

    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("command execution exceeded its deadline")]
    CommandTimeout,

    #[error(transparent)]
    Mime(#[from] MimeError),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SmtpError {
    /// Whether this failure ends the session. Socket trouble and protocol
    /// abuse are terminal; a bad address or an undecodable message body is
    /// answered with a 554 and the client may retry.
    pub fn is_terminal(&self) -> bool {
        match self {
            SmtpError::Io(_)
            | SmtpError::CommandTimeout
            | SmtpError::InvalidCommand(_)
            | SmtpError::InvalidCommandFormat(_) => true,

            SmtpError::InvalidEmail(_) | SmtpError::Mime(_) => false,

            SmtpError::ServerClosed
            | SmtpError::ConnectionExists(_)
            | SmtpError::ConnectionNotExists(_)
            | SmtpError::NoWorkerAvailable
            | SmtpError::Certificate(_) => true,
        }
    }
}
