//! Background writer for one sheet's documents.
//!
//! Snapshots are taken under the session lock and handed over a channel; the
//! file write happens on the saver thread. When several snapshots are queued
//! only the newest is written.

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use gridsync_io::{ReadWriteError, SheetDocument};

#[derive(Debug)]
pub struct SheetSaver {
    tx: Option<mpsc::Sender<SheetDocument>>,
    handle: Option<JoinHandle<()>>,
}

impl SheetSaver {
    /// Write snapshots of sheet `name` to `path`.
    pub fn spawn(name: &str, path: PathBuf) -> Result<Self, ReadWriteError> {
        let label = name.to_string();
        Self::with_writer(name, move |doc| {
            doc.write(&path)?;
            log::info!("Saved {} to {}", label, path.display());
            Ok(())
        })
    }

    pub fn with_writer<W>(name: &str, mut write: W) -> Result<Self, ReadWriteError>
    where
        W: FnMut(&SheetDocument) -> Result<(), ReadWriteError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<SheetDocument>();
        let label = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("save-{}", name))
            .spawn(move || {
                while let Ok(mut doc) = rx.recv() {
                    for newer in rx.try_iter() {
                        doc = newer;
                    }
                    if let Err(e) = write(&doc) {
                        log::error!("Failed to save {}: {}", label, e);
                    }
                }
            })
            .map_err(|e| ReadWriteError::Io(format!("failed to start saver for {}: {}", name, e)))?;

        Ok(Self { tx: Some(tx), handle: Some(handle) })
    }

    /// Hand a snapshot to the writer thread.
    pub fn queue(&self, doc: SheetDocument) {
        let sent = self.tx.as_ref().is_some_and(|tx| tx.send(doc).is_ok());
        if !sent {
            log::error!("Saver thread is gone, snapshot dropped");
        }
    }

    /// Block until every queued snapshot has been written.
    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for SheetSaver {
    fn drop(&mut self) {
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
