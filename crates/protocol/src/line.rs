//! Bounded line framing over a byte stream.
//!
//! `LineReader` keeps partially received bytes across read timeouts, so a
//! socket with a short read timeout can be polled without losing the start
//! of a line that is still arriving.

use std::fmt;
use std::io::{self, Read, Write};

const READ_CHUNK: usize = 4096;

/// Errors from [`LineReader::read_line`].
#[derive(Debug)]
pub enum LineError {
    /// The peer closed the stream between lines.
    Closed,
    /// The peer closed the stream in the middle of a line.
    Truncated,
    /// A line exceeded the configured limit.
    ///
    /// If its newline had already arrived the line is dropped and the next
    /// call returns the following line. Otherwise the buffered prefix is
    /// discarded and the rest of that line will be read as if it were new,
    /// so the stream is no longer framed.
    TooLong { limit: usize },
    InvalidUtf8,
    Io(io::Error),
}

impl LineError {
    /// True for the read-timeout errors a polling loop should retry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut
        )
    }
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Truncated => write!(f, "connection closed mid-line (no newline)"),
            Self::TooLong { limit } => write!(f, "line exceeds {} byte limit", limit),
            Self::InvalidUtf8 => write!(f, "line is not valid UTF-8"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for LineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for LineError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Reads `\n`-terminated lines (a trailing `\r` is stripped).
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            max_line_bytes,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Bytes received but not yet returned as a line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete line.
    ///
    /// Read timeouts surface as `LineError::Io` (see [`LineError::is_timeout`])
    /// and leave any partial line buffered for the next call.
    pub fn read_line(&mut self) -> Result<String, LineError> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buf[scanned..].iter().position(|b| *b == b'\n') {
                let end = scanned + pos;
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if line.len() > self.max_line_bytes {
                    return Err(LineError::TooLong { limit: self.max_line_bytes });
                }
                return String::from_utf8(line).map_err(|_| LineError::InvalidUtf8);
            }
            scanned = self.buf.len();

            if self.buf.len() > self.max_line_bytes {
                self.buf.clear();
                return Err(LineError::TooLong { limit: self.max_line_bytes });
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    return Err(if self.buf.is_empty() {
                        LineError::Closed
                    } else {
                        LineError::Truncated
                    });
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(LineError::Io(e)),
            }
        }
    }
}

/// Write `line` followed by `\n`, then flush.
pub fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}
