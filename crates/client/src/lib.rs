//! GridSync client: keeps a local sheet in step with a session coordinator.
//!
//! - [`SyncMachine`]: the per-connection protocol state machine
//! - [`Communicator`]: socket, threads and outbound commands
//! - [`SheetMirror`]: a [`SyncHandler`] that applies updates to a shared sheet

pub mod communicator;
pub mod config;
pub mod error;
pub mod mirror;
pub mod sync;

pub use communicator::{register_user_as_admin, Communicator, SyncHandler};
pub use config::ClientConfig;
pub use error::ClientError;
pub use mirror::{MirrorListener, SheetMirror};
pub use sync::{SyncEvent, SyncMachine, SyncState};
