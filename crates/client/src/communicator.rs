//! Client side of the sync protocol.
//!
//! A [`Communicator`] owns at most one connection. Each connection runs three
//! threads:
//!
//! - **reader**: blocking line reads, parses each line and pushes it onto the
//!   inbound channel, then immediately reads the next one
//! - **dispatcher**: drains the inbound channel through a [`SyncMachine`] and
//!   invokes the [`SyncHandler`]
//! - **writer**: drains the outbound channel onto the socket
//!
//! Outbound operations only enqueue a line and return. Replies carry no
//! correlation id, so an `error` can only be tied to the most recent relevant
//! request by convention.
//!
//! There is no read timeout: a stalled server stalls updates on that
//! connection until [`Communicator::close`] tears it down.

use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use gridsync_protocol::{
    write_line, ClientCommand, ErrorCode, LineError, LineReader, ServerMessage, ADMIN_USER,
};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::sync::{SyncEvent, SyncMachine, SyncState};

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Callbacks fired from the dispatcher thread.
///
/// They run concurrently with whatever thread owns the `Communicator`, so
/// implementations guard their own state (typically with the same lock that
/// guards the sheet).
pub trait SyncHandler: Send + Sync {
    fn on_cell_updated(&self, name: &str, contents: &str);
    fn on_error(&self, code: ErrorCode, message: &str);
    /// Initial population finished. Called once per connection.
    fn on_ready(&self);
}

pub struct Communicator {
    handler: Arc<dyn SyncHandler>,
    config: ClientConfig,
    conn: Option<Connection>,
}

impl Communicator {
    pub fn new(handler: Arc<dyn SyncHandler>, config: ClientConfig) -> Self {
        Self { handler, config, conn: None }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a connection and send `connect <user> <sheet>`.
    ///
    /// Any previous connection is closed first.
    pub fn connect<A: ToSocketAddrs>(&mut self, addr: A, user: &str, sheet: &str) -> Result<(), ClientError> {
        self.close();

        let stream = open_stream(addr, self.config.connect_timeout())?;
        let peer = stream.peer_addr()?;
        let conn = Connection::start(stream, Arc::clone(&self.handler), self.config.max_line_bytes)?;
        conn.machine.lock().begin_connect();
        let conn = self.conn.insert(conn);
        conn.send(&ClientCommand::Connect { user: user.to_string(), sheet: sheet.to_string() })?;

        log::info!("Connected to {} as {} (sheet {})", peer, user, sheet);
        Ok(())
    }

    pub fn register_user(&self, user: &str) -> Result<(), ClientError> {
        self.send(&ClientCommand::Register { user: user.to_string() })
    }

    pub fn edit_cell(&self, name: &str, contents: &str) -> Result<(), ClientError> {
        self.send(&ClientCommand::Cell { name: name.to_string(), contents: contents.to_string() })
    }

    pub fn undo_last(&self) -> Result<(), ClientError> {
        self.send(&ClientCommand::Undo)
    }

    /// Tear down the connection. Messages still in flight are discarded.
    /// Handlers are kept for the next `connect`.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            log::debug!("Closing connection to {:?}", conn.stream.peer_addr().ok());
            drop(conn);
        }
    }

    /// False once the server hangs up or the connection fails, even before
    /// `close` is called.
    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| !c.is_lost())
    }

    pub fn state(&self) -> SyncState {
        match &self.conn {
            Some(conn) if !conn.is_lost() => conn.machine.lock().state(),
            _ => SyncState::Disconnected,
        }
    }

    fn send(&self, cmd: &ClientCommand) -> Result<(), ClientError> {
        self.conn.as_ref().ok_or(ClientError::NotConnected)?.send(cmd)
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Register `user` through a throwaway connection as the admin user.
///
/// Used when a plain `register` is refused. Sends `connect sysadmin <sheet>`
/// and `register <user>`, then waits for the server to hang up. A user that
/// is already registered counts as success.
pub fn register_user_as_admin<A: ToSocketAddrs>(
    addr: A,
    user: &str,
    sheet: &str,
    config: &ClientConfig,
) -> Result<(), ClientError> {
    let mut stream = open_stream(addr, config.connect_timeout())?;
    stream.set_read_timeout(Some(config.connect_timeout()))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

    let connect = ClientCommand::Connect { user: ADMIN_USER.to_string(), sheet: sheet.to_string() };
    write_line(&mut stream, &connect.to_line())?;
    write_line(&mut stream, &ClientCommand::Register { user: user.to_string() }.to_line())?;
    stream.shutdown(Shutdown::Write)?;

    let mut reader = LineReader::new(stream, config.max_line_bytes);
    loop {
        match reader.read_line() {
            Ok(line) => match ServerMessage::parse(&line) {
                Ok(ServerMessage::Error { code: ErrorCode::InvalidUsername, .. }) => {
                    log::debug!("{} is already registered", user);
                }
                Ok(ServerMessage::Error { code, message }) => {
                    return Err(ClientError::Server { code, message });
                }
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unparseable line {:?}: {}", line, e),
            },
            Err(LineError::Closed) | Err(LineError::Truncated) => return Ok(()),
            Err(e) => return Err(ClientError::Io(e.to_string())),
        }
    }
}

fn open_stream<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<TcpStream, ClientError> {
    let addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(ClientError::ConnectionFailed(
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "address did not resolve".to_string()),
    ))
}

// ============================================================================
// Connection threads
// ============================================================================

struct Connection {
    stream: TcpStream,
    machine: Arc<Mutex<SyncMachine>>,
    closed: Arc<AtomicBool>,
    /// Set when the reader thread exits.
    lost: Arc<AtomicBool>,
    outbound: Option<mpsc::Sender<String>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Connection {
    fn start(stream: TcpStream, handler: Arc<dyn SyncHandler>, max_line_bytes: usize) -> Result<Self, ClientError> {
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

        let machine = Arc::new(Mutex::new(SyncMachine::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let lost = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerMessage>();
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>();

        let read_stream = stream.try_clone()?;
        let write_stream = stream.try_clone()?;

        let reader = {
            let closed = Arc::clone(&closed);
            let lost = Arc::clone(&lost);
            thread::spawn(move || {
                run_reader(read_stream, max_line_bytes, inbound_tx, closed);
                lost.store(true, Ordering::SeqCst);
            })
        };
        let writer = thread::spawn(move || run_writer(write_stream, outbound_rx));
        let dispatcher = {
            let machine = Arc::clone(&machine);
            let closed = Arc::clone(&closed);
            thread::spawn(move || run_dispatcher(inbound_rx, machine, handler, closed))
        };

        Ok(Self {
            stream,
            machine,
            closed,
            lost,
            outbound: Some(outbound_tx),
            reader: Some(reader),
            writer: Some(writer),
            dispatcher: Some(dispatcher),
        })
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn send(&self, cmd: &ClientCommand) -> Result<(), ClientError> {
        let line = cmd.to_line();
        if line.contains('\n') || line.contains('\r') {
            return Err(ClientError::InvalidInput(format!("line break in {:?}", line)));
        }
        if self.is_lost() {
            return Err(ClientError::NotConnected);
        }
        let outbound = self.outbound.as_ref().ok_or(ClientError::NotConnected)?;
        outbound.send(line).map_err(|_| ClientError::NotConnected)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Queued sends go out before the socket is shut down.
        self.outbound.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }

        {
            let mut machine = self.machine.lock();
            self.closed.store(true, Ordering::SeqCst);
            machine.reset();
        }

        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            // A handler may close the connection from inside a callback.
            if dispatcher.thread().id() != thread::current().id() {
                let _ = dispatcher.join();
            }
        }
    }
}

fn run_reader(
    stream: TcpStream,
    max_line_bytes: usize,
    inbound: mpsc::Sender<ServerMessage>,
    closed: Arc<AtomicBool>,
) {
    let mut reader = LineReader::new(stream, max_line_bytes);
    loop {
        match reader.read_line() {
            Ok(line) => match ServerMessage::parse(&line) {
                Ok(msg) => {
                    if inbound.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("Skipping unparseable line {:?}: {}", line, e),
            },
            Err(LineError::InvalidUtf8) => log::warn!("Skipping line that is not valid UTF-8"),
            Err(LineError::Closed) => {
                log::debug!("Server closed the connection");
                break;
            }
            Err(e) => {
                if !closed.load(Ordering::SeqCst) {
                    log::warn!("Read failed: {}", e);
                }
                break;
            }
        }
    }
}

fn run_writer(mut stream: TcpStream, outbound: mpsc::Receiver<String>) {
    for line in outbound {
        if let Err(e) = write_line(&mut stream, &line) {
            log::warn!("Send failed: {}", e);
            break;
        }
    }
}

fn run_dispatcher(
    inbound: mpsc::Receiver<ServerMessage>,
    machine: Arc<Mutex<SyncMachine>>,
    handler: Arc<dyn SyncHandler>,
    closed: Arc<AtomicBool>,
) {
    for msg in inbound {
        let events = {
            let mut machine = machine.lock();
            if closed.load(Ordering::SeqCst) {
                break;
            }
            machine.on_message(msg)
        };

        for event in events {
            if closed.load(Ordering::SeqCst) {
                return;
            }
            match event {
                SyncEvent::CellUpdated { name, contents } => handler.on_cell_updated(&name, &contents),
                SyncEvent::Error { code, message } => handler.on_error(code, &message),
                SyncEvent::Ready => handler.on_ready(),
            }
        }
    }
}
