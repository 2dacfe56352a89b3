//! TCP front end for the coordinator.
//!
//! One listener thread polls a non-blocking socket so it can notice the
//! shutdown flag. Each accepted connection gets its own thread that
//! alternates between flushing its outbox and reading one line with a short
//! timeout.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gridsync_protocol::{write_line, ClientCommand, ErrorCode, LineError, LineReader, ParseError, ServerMessage};

use crate::config::ServerConfig;
use crate::coordinator::{ClientSession, Coordinator};
use crate::error::ServerError;
use crate::users::UserRegistry;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_POLL: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SheetServer {
    config: ServerConfig,
    coordinator: Option<Arc<Coordinator>>,
    listener_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    bound_addr: Option<SocketAddr>,
}

impl SheetServer {
    /// Create a server (not started).
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            coordinator: None,
            listener_handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            bound_addr: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Load the users file, bind, and start accepting connections.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.is_running() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.config.data_dir).map_err(|e| {
            ServerError::Io(format!("{}: {}", self.config.data_dir.display(), e))
        })?;
        let users = UserRegistry::load(self.config.users_path())
            .map_err(|e| ServerError::Io(format!("{}: {}", self.config.users_path().display(), e)))?;

        let listener = TcpListener::bind(self.config.addr())?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let coordinator = Arc::new(Coordinator::new(self.config.clone(), users));
        self.shutdown.store(false, Ordering::SeqCst);
        self.bound_addr = Some(addr);
        self.coordinator = Some(Arc::clone(&coordinator));

        let shutdown = Arc::clone(&self.shutdown);
        self.listener_handle = Some(thread::spawn(move || {
            run_listener(listener, shutdown, coordinator);
        }));

        log::info!("Sheet server listening on {} (data in {})", addr, self.config.data_dir.display());
        Ok(())
    }

    /// Stop accepting, disconnect every client and wait for their sheets to
    /// be saved.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
        self.coordinator = None;
        self.bound_addr = None;

        log::info!("Sheet server stopped");
    }

    /// Block until the listener thread exits (an accept error, or `stop`
    /// from another owner of the shutdown flag).
    pub fn wait(&mut self) {
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.coordinator = None;
        self.bound_addr = None;
    }

    pub fn is_running(&self) -> bool {
        self.listener_handle.is_some() && !self.shutdown.load(Ordering::SeqCst)
    }

    /// Get the bound address (if running).
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Sheets that currently have clients.
    pub fn open_sheets(&self) -> Vec<String> {
        self.coordinator
            .as_ref()
            .map(|c| c.open_sheets())
            .unwrap_or_default()
    }
}

impl Drop for SheetServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_listener(listener: TcpListener, shutdown: Arc<AtomicBool>, coordinator: Arc<Coordinator>) {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::debug!("Accepted connection from {}", addr);
                let coordinator = Arc::clone(&coordinator);
                let shutdown = Arc::clone(&shutdown);
                connections.retain(|handle| !handle.is_finished());
                connections.push(thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &coordinator, &shutdown) {
                        log::warn!("Connection error from {}: {}", addr, e);
                    }
                    log::debug!("Connection from {} closed", addr);
                }));
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
                break;
            }
        }
    }

    for handle in connections {
        let _ = handle.join();
    }
}

fn handle_connection(stream: TcpStream, coordinator: &Coordinator, shutdown: &AtomicBool) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

    let (outbox, inbox) = mpsc::channel();
    let mut client = coordinator.new_client(outbox);
    let result = serve(stream, coordinator, &mut client, &inbox, shutdown);
    coordinator.leave(&mut client);
    result
}

fn serve(
    mut stream: TcpStream,
    coordinator: &Coordinator,
    client: &mut ClientSession,
    inbox: &mpsc::Receiver<String>,
    shutdown: &AtomicBool,
) -> io::Result<()> {
    let max_parse_failures = coordinator.config().max_parse_failures;
    let mut reader = LineReader::new(stream.try_clone()?, coordinator.config().max_line_bytes);
    let mut parse_failures: u32 = 0;

    loop {
        flush(&mut stream, inbox)?;
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }

        let line = match reader.read_line() {
            Ok(line) => Some(line),
            Err(e) if e.is_timeout() => continue,
            Err(LineError::Closed) => return Ok(()),
            Err(LineError::Truncated) => {
                log::debug!("Client {} hung up mid-line", client.id());
                return Ok(());
            }
            Err(LineError::TooLong { limit }) => {
                log::warn!("Client {} sent a line over {} bytes, disconnecting", client.id(), limit);
                return Ok(());
            }
            Err(LineError::InvalidUtf8) => None,
            Err(LineError::Io(e)) => return Err(e),
        };

        let parsed = match &line {
            Some(line) => ClientCommand::parse(line),
            None => Err(ParseError::UnknownCommand(String::new())),
        };
        match parsed {
            Ok(cmd) => {
                parse_failures = 0;
                log::debug!("Client {}: {}", client.id(), cmd);
                coordinator.handle(client, cmd);
            }
            Err(ParseError::Empty) => {}
            Err(e) => {
                parse_failures += 1;
                log::debug!(
                    "Malformed line from client {} ({}/{}): {}",
                    client.id(),
                    parse_failures,
                    max_parse_failures,
                    e
                );
                let command = line.as_deref().map(command_word).unwrap_or_default();
                write_line(
                    &mut stream,
                    &ServerMessage::error(ErrorCode::UnrecognizedCommand, command).to_line(),
                )?;

                if parse_failures >= max_parse_failures {
                    log::warn!("Client {} exceeded parse failure limit, disconnecting", client.id());
                    flush(&mut stream, inbox)?;
                    return Ok(());
                }
            }
        }
    }
}

/// Write everything queued for this connection.
fn flush(stream: &mut TcpStream, inbox: &mpsc::Receiver<String>) -> io::Result<()> {
    for line in inbox.try_iter() {
        write_line(stream, &line)?;
    }
    Ok(())
}

fn command_word(line: &str) -> &str {
    line.split_once(' ').map(|(word, _)| word).unwrap_or(line)
}
