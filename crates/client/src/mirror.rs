//! Applies inbound cell updates to a local sheet.

use std::sync::Arc;

use gridsync_engine::SharedSheet;
use gridsync_protocol::ErrorCode;

use crate::communicator::SyncHandler;

/// Receives what a [`SheetMirror`] did with each inbound message.
///
/// Called without the sheet lock held, so implementations may lock the sheet
/// to read the refreshed values.
pub trait MirrorListener: Send + Sync {
    /// Cells whose displayed value may have changed, edited cell first.
    fn on_refresh(&self, _cells: &[String]) {}
    fn on_error(&self, _code: ErrorCode, _message: &str) {}
    fn on_ready(&self) {}
}

impl MirrorListener for () {}

impl<T: MirrorListener + ?Sized> MirrorListener for Arc<T> {
    fn on_refresh(&self, cells: &[String]) {
        (**self).on_refresh(cells)
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        (**self).on_error(code, message)
    }

    fn on_ready(&self) {
        (**self).on_ready()
    }
}

/// A [`SyncHandler`] that keeps a [`SharedSheet`] in step with the server.
pub struct SheetMirror<L = ()> {
    sheet: SharedSheet,
    listener: L,
}

impl<L: MirrorListener> SheetMirror<L> {
    pub fn new(sheet: SharedSheet, listener: L) -> Self {
        Self { sheet, listener }
    }

    pub fn sheet(&self) -> &SharedSheet {
        &self.sheet
    }
}

impl<L: MirrorListener> SyncHandler for SheetMirror<L> {
    fn on_cell_updated(&self, name: &str, contents: &str) {
        let result = self.sheet.lock().set_contents_of_cell(name, contents);
        match result {
            Ok(affected) => self.listener.on_refresh(&affected),
            Err(e) => log::warn!("Local sheet rejected server update for {}: {}", name, e),
        }
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        log::debug!("Server error {}: {}", code, message);
        self.listener.on_error(code, message);
    }

    fn on_ready(&self) {
        self.listener.on_ready();
    }
}
