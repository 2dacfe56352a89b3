//! One shared sheet and the clients attached to it.
//!
//! Every message to a client, including direct replies, goes through that
//! client's outbox. A session is only touched under its lock, so a joining
//! client receives its snapshot before any edit broadcast made after it.
//! Saving only snapshots the sheet under the lock; the file is written by
//! the session's [`SheetSaver`] thread.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use gridsync_engine::{NameRules, Sheet, SheetError, DEFAULT_VERSION};
use gridsync_io::{ReadWriteError, SheetDocument};
use gridsync_protocol::ServerMessage;

use crate::saver::SheetSaver;

pub type ClientId = u64;

/// Lines queued for one connection's socket.
pub type Outbox = mpsc::Sender<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct HistoryEntry {
    name: String,
    previous: String,
}

#[derive(Debug)]
pub struct SheetSession {
    name: String,
    path: PathBuf,
    sheet: Sheet,
    history: Vec<HistoryEntry>,
    clients: Vec<(ClientId, Outbox)>,
    saver: Option<SheetSaver>,
}

impl SheetSession {
    /// Load `path`, or start an empty sheet if it does not exist yet.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, ReadWriteError> {
        let name = name.into();
        let path = path.into();
        let saver = SheetSaver::spawn(&name, path.clone())?;
        Self::with_saver(name, path, saver)
    }

    /// Like [`open`](Self::open), with snapshots going to `saver`.
    pub fn with_saver(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        saver: SheetSaver,
    ) -> Result<Self, ReadWriteError> {
        let path = path.into();
        let sheet = gridsync_io::load_or_new(&path, NameRules::uppercase(), DEFAULT_VERSION)?;
        Ok(Self {
            name: name.into(),
            path,
            sheet,
            history: Vec::new(),
            clients: Vec::new(),
            saver: Some(saver),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Queue `connected N` and the N cell lines for a new client, then add it
    /// to the broadcast set.
    pub fn attach(&mut self, id: ClientId, outbox: Outbox) {
        let cells = self.sheet.nonempty_cells();
        let mut lines = Vec::with_capacity(cells.len() + 1);
        lines.push(ServerMessage::Connected { count: cells.len() }.to_line());
        for name in cells {
            let contents = match self.sheet.get_cell_contents(&name) {
                Ok(contents) => contents.to_input(),
                Err(e) => {
                    log::error!("Sheet {} lists unreadable cell {}: {}", self.name, name, e);
                    String::new()
                }
            };
            lines.push(ServerMessage::Cell { name, contents }.to_line());
        }

        if lines.into_iter().all(|line| outbox.send(line).is_ok()) {
            self.clients.push((id, outbox));
            log::debug!("Client {} attached to {} ({} attached)", id, self.name, self.clients.len());
        }
    }

    /// Remove a client. Returns true when nobody is left.
    pub fn detach(&mut self, id: ClientId) -> bool {
        self.clients.retain(|(client, _)| *client != id);
        log::debug!("Client {} left {} ({} attached)", id, self.name, self.clients.len());
        self.clients.is_empty()
    }

    /// Apply an edit, remember what it replaced and broadcast the canonical
    /// contents to every attached client.
    pub fn edit(&mut self, name: &str, contents: &str) -> Result<(), SheetError> {
        let name = self
            .sheet
            .rules()
            .resolve(name)
            .ok_or_else(|| SheetError::InvalidName(name.to_string()))?;
        let previous = self.sheet.get_cell_contents(&name)?.to_input();

        self.sheet.set_contents_of_cell(&name, contents)?;
        self.history.push(HistoryEntry { name: name.clone(), previous });
        self.publish(name)
    }

    /// Revert the most recent edit. Returns `Ok(false)` when there is none.
    ///
    /// A revert that the sheet refuses is dropped from the history.
    pub fn undo(&mut self) -> Result<bool, SheetError> {
        let Some(entry) = self.history.pop() else {
            return Ok(false);
        };
        self.sheet.set_contents_of_cell(&entry.name, &entry.previous)?;
        self.publish(entry.name)?;
        Ok(true)
    }

    /// Queue a snapshot for the saver if anything changed since the last one.
    pub fn save(&mut self) {
        if !self.sheet.is_changed() {
            return;
        }
        let doc = SheetDocument::from_sheet(&self.sheet);
        self.sheet.mark_saved();
        match &self.saver {
            Some(saver) => saver.queue(doc),
            None => log::error!("Sheet {} is closed, edit not saved", self.name),
        }
    }

    /// Queue the final snapshot and hand back the saver, so the caller can
    /// wait for the write without holding this session's lock.
    pub fn close(&mut self) -> Option<SheetSaver> {
        self.save();
        self.saver.take()
    }

    fn publish(&mut self, name: String) -> Result<(), SheetError> {
        let contents = self.sheet.get_cell_contents(&name)?.to_input();
        self.broadcast(&ServerMessage::Cell { name, contents });
        self.save();
        Ok(())
    }

    fn broadcast(&mut self, msg: &ServerMessage) {
        let line = msg.to_line();
        self.clients.retain(|(id, outbox)| {
            let alive = outbox.send(line.clone()).is_ok();
            if !alive {
                log::debug!("Dropping client {}: outbox closed", id);
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tempfile::tempdir;

    fn drain(rx: &mpsc::Receiver<String>) -> Vec<String> {
        rx.try_iter().collect()
    }

    fn open(dir: &Path) -> SheetSession {
        SheetSession::open("budget", dir.join("budget.json")).unwrap()
    }

    #[test]
    fn test_attach_sends_snapshot() {
        let dir = tempdir().unwrap();
        let mut session = open(dir.path());
        session.edit("a1", "5").unwrap();
        session.edit("B1", "=a1 * 2").unwrap();

        let (tx, rx) = mpsc::channel();
        session.attach(1, tx);
        assert_eq!(drain(&rx), vec!["connected 2", "cell A1 5", "cell B1 =A1*2"]);
        assert_eq!(session.client_count(), 1);
    }

    #[test]
    fn test_edit_broadcasts_to_everyone() {
        let dir = tempdir().unwrap();
        let mut session = open(dir.path());
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        session.attach(1, tx1);
        session.attach(2, tx2);
        drain(&rx1);
        drain(&rx2);

        session.edit("c3", "007").unwrap();
        assert_eq!(drain(&rx1), vec!["cell C3 7"]);
        assert_eq!(drain(&rx2), vec!["cell C3 7"]);
    }

    #[test]
    fn test_rejected_edit_is_silent() {
        let dir = tempdir().unwrap();
        let mut session = open(dir.path());
        let (tx, rx) = mpsc::channel();
        session.attach(1, tx);
        drain(&rx);

        assert!(matches!(
            session.edit("A1", "=A1+1"),
            Err(SheetError::CircularDependency { .. })
        ));
        assert!(matches!(session.edit("1A", "x"), Err(SheetError::InvalidName(_))));
        assert!(drain(&rx).is_empty());
        assert_eq!(session.history_len(), 0);
    }

    #[test]
    fn test_undo_restores_previous() {
        let dir = tempdir().unwrap();
        let mut session = open(dir.path());
        let (tx, rx) = mpsc::channel();
        session.attach(1, tx);

        session.edit("A1", "hello world").unwrap();
        session.edit("A1", "42").unwrap();
        assert!(session.undo().unwrap());
        assert!(session.undo().unwrap());
        assert!(!session.undo().unwrap());

        assert_eq!(
            drain(&rx),
            vec!["connected 0", "cell A1 hello world", "cell A1 42", "cell A1 hello world", "cell A1 "]
        );
        assert!(session.sheet().nonempty_cells().is_empty());
    }

    #[test]
    fn test_edits_are_saved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("budget.json");
        {
            let mut session = open(dir.path());
            session.edit("A1", "5").unwrap();
            session.edit("B1", "=A1+1").unwrap();
            assert!(!session.sheet().is_changed());
            session.close().unwrap().finish();
        }

        let reopened = open(dir.path());
        assert_eq!(reopened.path(), path);
        assert_eq!(reopened.sheet().nonempty_cells(), vec!["A1", "B1"]);
    }

    #[test]
    fn test_closed_outbox_is_dropped() {
        let dir = tempdir().unwrap();
        let mut session = open(dir.path());
        let (tx, rx) = mpsc::channel();
        session.attach(1, tx);
        drop(rx);

        session.edit("A1", "1").unwrap();
        assert_eq!(session.client_count(), 0);
        assert!(session.detach(1));
    }

    #[test]
    fn test_edits_do_not_wait_for_disk() {
        let dir = tempdir().unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let written = Arc::new(Mutex::new(Vec::new()));
        let saver = {
            let written = Arc::clone(&written);
            SheetSaver::with_writer("budget", move |doc| {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
                written.lock().push(doc.cells.len());
                Ok(())
            })
            .unwrap()
        };
        let session = SheetSession::with_saver("budget", dir.path().join("budget.json"), saver).unwrap();
        let session = Arc::new(Mutex::new(session));

        session.lock().edit("A1", "1").unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The first write is blocked; another client's edit still goes through.
        let other = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.lock().edit("B1", "=A1+1"))
        };
        other.join().unwrap().unwrap();
        assert_eq!(session.lock().sheet().nonempty_cells(), vec!["A1", "B1"]);
        assert!(written.lock().is_empty());

        drop(release_tx);
        let saver = session.lock().close().unwrap();
        saver.finish();
        assert_eq!(written.lock().last(), Some(&2));
    }
}
