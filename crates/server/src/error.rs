use std::fmt;

/// Errors that stop the coordinator from starting.
///
/// Per-command failures are never `ServerError`s; they go back to the client
/// as `error N` lines.
#[derive(Debug)]
pub enum ServerError {
    Io(String),
    /// Config file could not be read or parsed.
    Config(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
