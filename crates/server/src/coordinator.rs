//! Command handling shared by all connection threads.
//!
//! Lock order: `sessions` before any single session, `users` on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use gridsync_engine::SheetError;
use gridsync_protocol::{ClientCommand, ErrorCode, ServerMessage};

use crate::config::ServerConfig;
use crate::session::{ClientId, Outbox, SheetSession};
use crate::users::UserRegistry;

const ALREADY_CONNECTED: &str = "You are already connected to a spreadsheet.";
const LOAD_FAILED: &str = "The spreadsheet could not be loaded correctly.";
const REGISTER_NOT_CONNECTED: &str =
    "You must be connected to a spreadsheet in order to register a user name.";
const ALREADY_REGISTERED: &str = "The username you are trying to register is already registered.";
const REGISTER_FAILED: &str = "The username could not be saved.";
const EDIT_NOT_CONNECTED: &str =
    "You must be connected to a spreadsheet in order to use an edit command.";
const UNDO_NOT_CONNECTED: &str = "You must be connected to a spreadsheet in order to undo an edit.";
const NOTHING_TO_UNDO: &str = "There is nothing to undo.";
const UNDO_FAILED: &str = "The last edit could not be undone.";

/// Per-connection state owned by the connection thread.
#[derive(Debug)]
pub struct ClientSession {
    id: ClientId,
    outbox: Outbox,
    user: Option<String>,
    session: Option<Arc<Mutex<SheetSession>>>,
}

impl ClientSession {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    fn reply(&self, msg: ServerMessage) {
        if self.outbox.send(msg.to_line()).is_err() {
            log::debug!("Client {} outbox closed", self.id);
        }
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>) {
        self.reply(ServerMessage::error(code, message));
    }
}

pub struct Coordinator {
    config: ServerConfig,
    users: Mutex<UserRegistry>,
    sessions: Mutex<FxHashMap<String, Arc<Mutex<SheetSession>>>>,
    next_client: AtomicU64,
}

impl Coordinator {
    pub fn new(config: ServerConfig, users: UserRegistry) -> Self {
        Self {
            config,
            users: Mutex::new(users),
            sessions: Mutex::new(FxHashMap::default()),
            next_client: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn new_client(&self, outbox: Outbox) -> ClientSession {
        ClientSession {
            id: self.next_client.fetch_add(1, Ordering::SeqCst),
            outbox,
            user: None,
            session: None,
        }
    }

    /// Names of the sheets that currently have clients, sorted.
    pub fn open_sheets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, user: &str) -> bool {
        self.users.lock().is_registered(user)
    }

    pub fn handle(&self, client: &mut ClientSession, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Connect { user, sheet } => self.connect(client, user, sheet),
            ClientCommand::Register { user } => self.register(client, &user),
            ClientCommand::Cell { name, contents } => self.edit(client, &name, &contents),
            ClientCommand::Undo => self.undo(client),
        }
    }

    /// Detach `client` from its sheet. The last client out saves the sheet
    /// and closes the session.
    pub fn leave(&self, client: &mut ClientSession) {
        let Some(session) = client.session.take() else {
            return;
        };

        let mut sessions = self.sessions.lock();
        let saver = {
            let mut guard = session.lock();
            if !guard.detach(client.id) {
                return;
            }
            sessions.remove(guard.name());
            log::info!("Closed sheet {}", guard.name());
            guard.close()
        };

        // Still holding `sessions`: a reconnect must not load the file
        // before the final write lands.
        if let Some(saver) = saver {
            saver.finish();
        }
    }

    fn connect(&self, client: &mut ClientSession, user: String, sheet: String) {
        if client.is_attached() {
            client.error(ErrorCode::UnrecognizedCommand, ALREADY_CONNECTED);
            return;
        }
        if !self.is_registered(&user) {
            client.error(ErrorCode::InvalidUsername, user);
            return;
        }

        let mut sessions = self.sessions.lock();
        let session = match sessions.get(&sheet) {
            Some(session) => Arc::clone(session),
            None => match self.open_session(&sheet) {
                Some(session) => {
                    let session = Arc::new(Mutex::new(session));
                    sessions.insert(sheet.clone(), Arc::clone(&session));
                    session
                }
                None => {
                    client.error(ErrorCode::Generic, LOAD_FAILED);
                    return;
                }
            },
        };

        session.lock().attach(client.id, client.outbox.clone());
        drop(sessions);

        log::info!("{} (client {}) joined {}", user, client.id, sheet);
        client.user = Some(user);
        client.session = Some(session);
    }

    fn open_session(&self, sheet: &str) -> Option<SheetSession> {
        if !is_sheet_name(sheet) {
            log::warn!("Refusing sheet name {:?}", sheet);
            return None;
        }
        match SheetSession::open(sheet, self.config.sheet_path(sheet)) {
            Ok(session) => {
                log::info!("Opened sheet {}", sheet);
                Some(session)
            }
            Err(e) => {
                log::warn!("Failed to load sheet {}: {}", sheet, e);
                None
            }
        }
    }

    fn register(&self, client: &ClientSession, user: &str) {
        if !client.is_attached() {
            client.error(ErrorCode::InvalidState, REGISTER_NOT_CONNECTED);
            return;
        }
        match self.users.lock().register(user) {
            Ok(true) => {}
            Ok(false) => client.error(ErrorCode::InvalidUsername, ALREADY_REGISTERED),
            Err(e) => {
                log::error!("Failed to register {}: {}", user, e);
                client.error(ErrorCode::Generic, REGISTER_FAILED);
            }
        }
    }

    fn edit(&self, client: &ClientSession, name: &str, contents: &str) {
        let Some(session) = &client.session else {
            client.error(ErrorCode::InvalidState, EDIT_NOT_CONNECTED);
            return;
        };

        if let Err(e) = session.lock().edit(name, contents) {
            log::debug!("Client {} edit of {} rejected: {}", client.id, name, e);
            client.error(ErrorCode::InvalidEdit, rejected_edit_message(name, &e));
        }
    }

    fn undo(&self, client: &ClientSession) {
        let Some(session) = &client.session else {
            client.error(ErrorCode::InvalidState, UNDO_NOT_CONNECTED);
            return;
        };

        match session.lock().undo() {
            Ok(true) => {}
            Ok(false) => client.error(ErrorCode::InvalidState, NOTHING_TO_UNDO),
            Err(e) => {
                log::warn!("Undo on client {} failed: {}", client.id, e);
                client.error(ErrorCode::InvalidState, UNDO_FAILED);
            }
        }
    }
}

fn rejected_edit_message(name: &str, err: &SheetError) -> String {
    let reason = match err {
        SheetError::CircularDependency { .. } => "a circular dependency occurred".to_string(),
        SheetError::InvalidName(_) => "the cell name is not valid".to_string(),
        SheetError::InvalidContent(msg) => format!("the contents are not valid ({})", msg),
        SheetError::FormulaParse(msg) => format!("the formula is not valid ({})", msg),
    };
    format!("When trying to edit cell {}, {}: the edit was not made.", name, reason)
}

/// Sheet names become file names under the data directory.
fn is_sheet_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
