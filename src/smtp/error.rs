//! Error types for the SMTP server

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Listening socket failed: {0}")]
    Listener(std::io::Error),

    #[error("Session already registered for {0}")]
    DuplicateSession(String),

    #[error("No session registered for {0}")]
    UnknownSession(String),

    #[error("Line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Cannot install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl SmtpError {
    /// Whether the server loop must stop. Only an over-long line is
    /// confined to the connection that sent it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SmtpError::LineTooLong { .. })
    }
}

/// Size limits for per-connection buffers
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum number of bytes buffered for a line that has not been terminated yet
    pub const INBOUND_BUFFER_MAX: usize = 64 * 1024;

    /// Number of bytes requested from the socket per read call
    pub const READ_CHUNK_SIZE: usize = 1024;
}
