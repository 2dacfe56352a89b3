// Sheet persistence - versioned JSON documents

pub mod document;
pub mod error;

pub use document::{load, load_or_new, save, saved_version, CellRecord, SheetDocument};
pub use error::ReadWriteError;

/// Document layout version.
/// Increment when the schema changes in a way that old versions can't read
pub const DOCUMENT_FORMAT: u32 = 1;
