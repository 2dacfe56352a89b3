//! GridSync wire protocol.
//!
//! Newline-terminated text lines over TCP, one command per line. Fields are
//! separated by single spaces; the last field of a `cell` or `error` line runs
//! to the end of the line and may itself contain spaces.
//!
//! ```text
//! client -> server    connect <user> <sheet>
//!                     register <user>
//!                     cell <name> <contents>
//!                     undo
//!
//! server -> client    connected <N>
//!                     cell <name> <contents>
//!                     error <code> <message>
//! ```
//!
//! Replies carry no correlation id. An `error` line can only be matched to
//! the most recent relevant request by convention.
//!
//! # Usage
//!
//! ```ignore
//! use gridsync_protocol::{ClientCommand, ServerMessage};
//!
//! let line = ClientCommand::Cell { name: "A1".into(), contents: "=B1*2".into() }.to_line();
//! let reply = ServerMessage::parse("connected 2")?;
//! ```

pub mod line;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use line::{write_line, LineError, LineReader};

/// Default TCP port of the session coordinator.
pub const DEFAULT_PORT: u16 = 2112;

/// Default upper bound for a single protocol line, newline excluded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// User that is always registered and may register others.
pub const ADMIN_USER: &str = "sysadmin";

// =============================================================================
// Client → Server
// =============================================================================

/// Commands sent from a client to the session coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Join `sheet` as `user`. Answered by `connected N` and N cell lines.
    Connect { user: String, sheet: String },
    /// Add a user name to the coordinator's registry.
    Register { user: String },
    /// Set the contents of a cell.
    Cell { name: String, contents: String },
    /// Revert the most recent edit on the sheet.
    Undo,
}

impl ClientCommand {
    /// Render without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Self::Connect { user, sheet } => format!("connect {} {}", user, sheet),
            Self::Register { user } => format!("register {}", user),
            Self::Cell { name, contents } => format!("cell {} {}", name, contents),
            Self::Undo => "undo".to_string(),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (command, rest) = split_field(line);
        match command {
            "" => Err(ParseError::Empty),
            "connect" => {
                let (user, sheet) = split_field(rest);
                Ok(Self::Connect {
                    user: required("connect", "user", user)?,
                    sheet: required("connect", "sheet", sheet)?,
                })
            }
            "register" => {
                let (user, _) = split_field(rest);
                Ok(Self::Register { user: required("register", "user", user)? })
            }
            "cell" => {
                let (name, contents) = split_field(rest);
                Ok(Self::Cell {
                    name: required("cell", "name", name)?,
                    contents: contents.to_string(),
                })
            }
            "undo" => Ok(Self::Undo),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

// =============================================================================
// Server → Client
// =============================================================================

/// Messages sent from the session coordinator to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Population header: `count` cell lines follow.
    Connected { count: usize },
    /// Current contents of a cell (initial population or a later edit).
    Cell { name: String, contents: String },
    /// A request failed.
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into() }
    }

    /// Render without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Self::Connected { count } => format!("connected {}", count),
            Self::Cell { name, contents } => format!("cell {} {}", name, contents),
            Self::Error { code, message } if message.is_empty() => format!("error {}", code),
            Self::Error { code, message } => format!("error {} {}", code, message),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let (command, rest) = split_field(line);
        match command {
            "" => Err(ParseError::Empty),
            "connected" => {
                let count = rest.trim();
                let count = count.parse::<usize>().map_err(|_| ParseError::InvalidNumber {
                    field: "count",
                    value: count.to_string(),
                })?;
                Ok(Self::Connected { count })
            }
            "cell" => {
                let (name, contents) = split_field(rest);
                Ok(Self::Cell {
                    name: required("cell", "name", name)?,
                    contents: contents.to_string(),
                })
            }
            "error" => {
                let (code, message) = split_field(rest);
                let code = code.parse::<u32>().map_err(|_| ParseError::InvalidNumber {
                    field: "code",
                    value: code.to_string(),
                })?;
                Ok(Self::Error { code: ErrorCode::from(code), message: message.to_string() })
            }
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Error codes carried by `error` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ErrorCode {
    /// 0: anything not covered below (load failures, I/O trouble).
    Generic,
    /// 1: the requested edit was rejected.
    InvalidEdit,
    /// 2: malformed or unrecognized command.
    UnrecognizedCommand,
    /// 3: command not valid in the connection's current state.
    InvalidState,
    /// 4: user name unknown or already taken.
    InvalidUsername,
    /// A code outside the closed set, kept verbatim.
    Unknown(u32),
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Generic => 0,
            Self::InvalidEdit => 1,
            Self::UnrecognizedCommand => 2,
            Self::InvalidState => 3,
            Self::InvalidUsername => 4,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Generic,
            1 => Self::InvalidEdit,
            2 => Self::UnrecognizedCommand,
            3 => Self::InvalidState,
            4 => Self::InvalidUsername,
            other => Self::Unknown(other),
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code.as_u32()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnknownCommand(String),
    MissingField { command: &'static str, field: &'static str },
    InvalidNumber { field: &'static str, value: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty line"),
            Self::UnknownCommand(cmd) => write!(f, "unknown command '{}'", cmd),
            Self::MissingField { command, field } => {
                write!(f, "'{}' is missing its {} field", command, field)
            }
            Self::InvalidNumber { field, value } => {
                write!(f, "{} is not a valid number: '{}'", field, value)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Split off the first space-delimited field. The remainder keeps any
/// further spaces.
fn split_field(s: &str) -> (&str, &str) {
    match s.split_once(' ') {
        Some((head, rest)) => (head, rest),
        None => (s, ""),
    }
}

fn required(command: &'static str, field: &'static str, value: &str) -> Result<String, ParseError> {
    if value.is_empty() {
        Err(ParseError::MissingField { command, field })
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_lines() {
        let connect = ClientCommand::Connect { user: "alice".into(), sheet: "budget".into() };
        assert_eq!(connect.to_line(), "connect alice budget");
        assert_eq!(ClientCommand::Undo.to_line(), "undo");
        assert_eq!(
            ClientCommand::Cell { name: "A1".into(), contents: "".into() }.to_line(),
            "cell A1 "
        );
    }

    #[test]
    fn test_cell_contents_keep_spaces() {
        let cmd = ClientCommand::parse("cell B2 = A1 + 2 ").unwrap();
        assert_eq!(cmd, ClientCommand::Cell { name: "B2".into(), contents: "= A1 + 2 ".into() });

        let msg = ServerMessage::parse("cell C3 hello world").unwrap();
        assert_eq!(msg, ServerMessage::Cell { name: "C3".into(), contents: "hello world".into() });
    }

    #[test]
    fn test_cell_without_contents_is_empty() {
        for line in ["cell A1", "cell A1 "] {
            assert_eq!(
                ServerMessage::parse(line).unwrap(),
                ServerMessage::Cell { name: "A1".into(), contents: String::new() }
            );
        }
    }

    #[test]
    fn test_client_parse_errors() {
        assert_eq!(ClientCommand::parse(""), Err(ParseError::Empty));
        assert_eq!(
            ClientCommand::parse("delete A1"),
            Err(ParseError::UnknownCommand("delete".into()))
        );
        assert_eq!(
            ClientCommand::parse("connect alice"),
            Err(ParseError::MissingField { command: "connect", field: "sheet" })
        );
        assert_eq!(
            ClientCommand::parse("register"),
            Err(ParseError::MissingField { command: "register", field: "user" })
        );
        assert_eq!(
            ClientCommand::parse("cell"),
            Err(ParseError::MissingField { command: "cell", field: "name" })
        );
    }

    #[test]
    fn test_server_parse() {
        assert_eq!(ServerMessage::parse("connected 0").unwrap(), ServerMessage::Connected { count: 0 });
        assert_eq!(
            ServerMessage::parse("error 4 bob").unwrap(),
            ServerMessage::error(ErrorCode::InvalidUsername, "bob")
        );
        assert_eq!(
            ServerMessage::parse("error 3").unwrap(),
            ServerMessage::error(ErrorCode::InvalidState, "")
        );
        assert!(matches!(
            ServerMessage::parse("connected many"),
            Err(ParseError::InvalidNumber { field: "count", .. })
        ));
        assert!(matches!(
            ServerMessage::parse("error x oops"),
            Err(ParseError::InvalidNumber { field: "code", .. })
        ));
        assert!(matches!(ServerMessage::parse("hello"), Err(ParseError::UnknownCommand(_))));
    }

    #[test]
    fn test_unknown_error_code_is_kept() {
        let msg = ServerMessage::parse("error 17 something new").unwrap();
        assert_eq!(msg, ServerMessage::error(ErrorCode::Unknown(17), "something new"));
        assert_eq!(msg.to_line(), "error 17 something new");
    }

    #[test]
    fn test_error_code_json() {
        let msg = ServerMessage::error(ErrorCode::InvalidEdit, "cycle");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"error","code":1,"message":"cycle"}"#);
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
