use std::fmt;

use gridsync_protocol::ErrorCode;

/// Errors surfaced to the caller of a [`Communicator`](crate::Communicator).
///
/// Protocol-level errors from the server normally arrive through
/// [`SyncHandler::on_error`](crate::SyncHandler::on_error); `Server` is only
/// used by the one-shot helpers that wait for a reply themselves.
#[derive(Debug)]
pub enum ClientError {
    /// An outbound operation was requested with no open connection.
    NotConnected,
    /// Resolving or connecting to the server failed.
    ConnectionFailed(String),
    /// A command that cannot be framed as a single protocol line.
    InvalidInput(String),
    Io(String),
    /// Config file could not be read or parsed.
    Config(String),
    Server { code: ErrorCode, message: String },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectionFailed(msg) => write!(f, "connection failed: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Server { code, message } => write!(f, "server error [{code}]: {message}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
