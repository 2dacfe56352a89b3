use std::fmt;

/// Errors surfaced by sheet edits and queries.
///
/// Every variant is raised before the store or the graph is touched, so a
/// failed call leaves the sheet exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetError {
    /// Malformed or validator-rejected cell name.
    InvalidName(String),
    /// Contents that cannot be stored (line breaks).
    InvalidContent(String),
    /// Committing the formula would close a dependency cycle through `cell`.
    CircularDependency { cell: String, via: String },
    /// Formula text after `=` does not parse.
    FormulaParse(String),
}

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid cell name: '{name}'"),
            Self::InvalidContent(msg) => write!(f, "invalid content: {msg}"),
            Self::CircularDependency { cell, via } => {
                write!(f, "circular dependency: {cell} would depend on itself through {via}")
            }
            Self::FormulaParse(msg) => write!(f, "formula parse error: {msg}"),
        }
    }
}

impl std::error::Error for SheetError {}
