use std::fmt;

/// Errors raised while reading or writing a sheet document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadWriteError {
    /// File could not be read, written or renamed.
    Io(String),
    /// File is not a valid sheet document.
    Format(String),
    /// Document was written with a different sheet version.
    VersionMismatch { expected: String, found: String },
    /// A stored cell was rejected by the sheet.
    InvalidCell { name: String, reason: String },
}

impl fmt::Display for ReadWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Format(msg) => write!(f, "invalid sheet document: {msg}"),
            Self::VersionMismatch { expected, found } => {
                write!(f, "version mismatch: expected '{expected}', found '{found}'")
            }
            Self::InvalidCell { name, reason } => write!(f, "cell {name}: {reason}"),
        }
    }
}

impl std::error::Error for ReadWriteError {}
