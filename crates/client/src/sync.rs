//! Connection-level sync state machine.
//!
//! Pure: feeds on parsed server messages and returns the callbacks to fire,
//! in order. The [`Communicator`](crate::Communicator) owns the I/O and drives
//! one machine per connection.

use gridsync_protocol::{ErrorCode, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    /// `connect` sent, waiting for the `connected N` header.
    AwaitingPopulationCount,
    /// Receiving the initial snapshot; `remaining` cell lines still expected.
    PopulatingCells { remaining: usize },
    Ready,
}

/// A callback the machine asks its driver to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    CellUpdated { name: String, contents: String },
    Error { code: ErrorCode, message: String },
    /// Initial population finished. Fired once per connection.
    Ready,
}

#[derive(Debug)]
pub struct SyncMachine {
    state: SyncState,
}

impl Default for SyncMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMachine {
    pub fn new() -> Self {
        Self { state: SyncState::Disconnected }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// A `connect` request went out.
    pub fn begin_connect(&mut self) {
        self.state = SyncState::AwaitingPopulationCount;
    }

    /// The transport was closed. Later messages are discarded.
    pub fn reset(&mut self) {
        self.state = SyncState::Disconnected;
    }

    pub fn on_message(&mut self, msg: ServerMessage) -> Vec<SyncEvent> {
        match (self.state, msg) {
            (SyncState::Disconnected, msg) => {
                log::debug!("Discarding message after close: {}", msg);
                Vec::new()
            }

            (SyncState::AwaitingPopulationCount, ServerMessage::Connected { count: 0 }) => {
                self.state = SyncState::Ready;
                vec![SyncEvent::Ready]
            }
            (SyncState::AwaitingPopulationCount, ServerMessage::Connected { count }) => {
                self.state = SyncState::PopulatingCells { remaining: count };
                Vec::new()
            }
            (_, ServerMessage::Connected { count }) => {
                log::warn!("Ignoring unexpected population header ({}) in state {:?}", count, self.state);
                Vec::new()
            }

            (SyncState::PopulatingCells { remaining }, ServerMessage::Cell { name, contents }) => {
                let mut events = vec![SyncEvent::CellUpdated { name, contents }];
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    self.state = SyncState::Ready;
                    events.push(SyncEvent::Ready);
                } else {
                    self.state = SyncState::PopulatingCells { remaining };
                }
                events
            }
            (_, ServerMessage::Cell { name, contents }) => {
                vec![SyncEvent::CellUpdated { name, contents }]
            }

            // Errors never count towards the population: the server may still
            // deliver the cell it belongs to.
            (_, ServerMessage::Error { code, message }) => vec![SyncEvent::Error { code, message }],
        }
    }
}
