//! GridSync session coordinator.
//!
//! Serves shared sheets over the line protocol: clients `connect` to a sheet
//! by name, receive its current cells, and see every accepted edit from every
//! other client as it happens.
//!
//! - [`SheetServer`]: listener and per-connection threads
//! - [`Coordinator`]: command semantics and the table of open sheets
//! - [`SheetSession`]: one sheet, its undo history and attached clients
//! - [`SheetSaver`]: writes a sheet's snapshots off the session lock
//! - [`UserRegistry`]: who may connect

pub mod config;
pub mod coordinator;
pub mod error;
pub mod saver;
pub mod server;
pub mod session;
pub mod users;

pub use config::ServerConfig;
pub use coordinator::{ClientSession, Coordinator};
pub use error::ServerError;
pub use saver::SheetSaver;
pub use server::SheetServer;
pub use session::{ClientId, Outbox, SheetSession};
pub use users::UserRegistry;
