//! Communicator tests against a scripted loopback server.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use gridsync_client::{
    register_user_as_admin, ClientConfig, ClientError, Communicator, SyncHandler, SyncState,
};
use gridsync_protocol::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Cell(String, String),
    Error(ErrorCode, String),
    Ready,
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn wait_for(&self, what: &str, pred: impl Fn(&[Event]) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if pred(&self.events.lock()) {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("timed out waiting for {}; events: {:?}", what, self.events());
    }
}

impl SyncHandler for Recorder {
    fn on_cell_updated(&self, name: &str, contents: &str) {
        self.events.lock().push(Event::Cell(name.to_string(), contents.to_string()));
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        self.events.lock().push(Event::Error(code, message.to_string()));
    }

    fn on_ready(&self) {
        self.events.lock().push(Event::Ready);
    }
}

/// Accept one connection, hand it to `script`, return what the client sent.
fn scripted_server<F>(script: F) -> (SocketAddr, JoinHandle<Vec<String>>)
where
    F: FnOnce(&mut BufReader<TcpStream>, &mut TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        script(&mut reader, &mut writer);

        // Collect whatever else arrives until the client hangs up
        let mut received = Vec::new();
        let mut line = String::new();
        while let Ok(n) = reader.read_line(&mut line) {
            if n == 0 {
                break;
            }
            received.push(line.trim_end().to_string());
            line.clear();
        }
        received
    });
    (addr, handle)
}

fn expect_line(reader: &mut BufReader<TcpStream>, expected: &str) {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line.trim_end(), expected);
}

fn send(writer: &mut TcpStream, text: &str) {
    writer.write_all(text.as_bytes()).unwrap();
    writer.flush().unwrap();
}

fn communicator(recorder: &Arc<Recorder>) -> Communicator {
    Communicator::new(recorder.clone(), ClientConfig::default())
}

#[test]
fn test_empty_sheet_ready_without_updates() {
    let (addr, server) = scripted_server(|reader, writer| {
        expect_line(reader, "connect alice budget");
        send(writer, "connected 0\n");
    });

    let recorder = Arc::new(Recorder::default());
    let mut comm = communicator(&recorder);
    comm.connect(addr, "alice", "budget").unwrap();
    recorder.wait_for("ready", |e| e.contains(&Event::Ready));

    assert_eq!(recorder.events(), vec![Event::Ready]);
    assert_eq!(comm.state(), SyncState::Ready);
    comm.close();
    server.join().unwrap();
}

#[test]
fn test_population_with_interleaved_errors() {
    let (addr, server) = scripted_server(|reader, writer| {
        expect_line(reader, "connect alice budget");
        send(writer, "connected 2\ncell A1 5\nerror 0 hiccup\ncell B1 =A1*2\ncell A1 6\n");
    });

    let recorder = Arc::new(Recorder::default());
    let mut comm = communicator(&recorder);
    comm.connect(addr, "alice", "budget").unwrap();
    recorder.wait_for("all lines", |e| e.len() == 5);

    assert_eq!(
        recorder.events(),
        vec![
            Event::Cell("A1".into(), "5".into()),
            Event::Error(ErrorCode::Generic, "hiccup".into()),
            Event::Cell("B1".into(), "=A1*2".into()),
            Event::Ready,
            Event::Cell("A1".into(), "6".into()),
        ]
    );
    drop(comm);
    server.join().unwrap();
}

#[test]
fn test_unparseable_lines_are_skipped() {
    let (addr, server) = scripted_server(|reader, writer| {
        expect_line(reader, "connect alice budget");
        send(writer, "bogus line\nconnected many\nconnected 1\ncell C3 hello world\n");
    });

    let recorder = Arc::new(Recorder::default());
    let mut comm = communicator(&recorder);
    comm.connect(addr, "alice", "budget").unwrap();
    recorder.wait_for("ready", |e| e.contains(&Event::Ready));

    assert_eq!(
        recorder.events(),
        vec![Event::Cell("C3".into(), "hello world".into()), Event::Ready]
    );
    comm.close();
    server.join().unwrap();
}

#[test]
fn test_outbound_commands_in_order() {
    let (addr, server) = scripted_server(|reader, writer| {
        expect_line(reader, "connect alice budget");
        send(writer, "connected 0\n");
    });

    let recorder = Arc::new(Recorder::default());
    let mut comm = communicator(&recorder);
    comm.connect(addr, "alice", "budget").unwrap();
    comm.edit_cell("A1", "=B1 + 1").unwrap();
    comm.register_user("bob").unwrap();
    comm.undo_last().unwrap();
    comm.edit_cell("A2", "").unwrap();
    comm.close();

    let received = server.join().unwrap();
    assert_eq!(received, vec!["cell A1 =B1 + 1", "register bob", "undo", "cell A2"]);
    assert_eq!(comm.state(), SyncState::Disconnected);
}

#[test]
fn test_commands_need_a_connection() {
    let recorder = Arc::new(Recorder::default());
    let comm = communicator(&recorder);
    assert!(matches!(comm.edit_cell("A1", "1"), Err(ClientError::NotConnected)));
    assert!(matches!(comm.undo_last(), Err(ClientError::NotConnected)));
    assert!(!comm.is_connected());
}

#[test]
fn test_line_breaks_rejected() {
    let (addr, server) = scripted_server(|reader, _| {
        expect_line(reader, "connect alice budget");
    });

    let recorder = Arc::new(Recorder::default());
    let mut comm = communicator(&recorder);
    comm.connect(addr, "alice", "budget").unwrap();
    assert!(matches!(comm.edit_cell("A1", "1\nundo"), Err(ClientError::InvalidInput(_))));
    comm.close();
    assert!(server.join().unwrap().is_empty());
}

#[test]
fn test_reconnect_closes_previous() {
    let (first_addr, first) = scripted_server(|reader, writer| {
        expect_line(reader, "connect alice one");
        send(writer, "connected 0\n");
    });
    let (second_addr, second) = scripted_server(|reader, writer| {
        expect_line(reader, "connect alice two");
        send(writer, "connected 1\ncell A1 2\n");
    });

    let recorder = Arc::new(Recorder::default());
    let mut comm = communicator(&recorder);
    comm.connect(first_addr, "alice", "one").unwrap();
    recorder.wait_for("first ready", |e| e.contains(&Event::Ready));

    comm.connect(second_addr, "alice", "two").unwrap();
    // The first server sees the hang-up as soon as the second connect starts
    first.join().unwrap();

    recorder.wait_for("second ready", |e| e.iter().filter(|ev| **ev == Event::Ready).count() == 2);
    assert_eq!(
        recorder.events(),
        vec![Event::Ready, Event::Cell("A1".into(), "2".into()), Event::Ready]
    );
    comm.close();
    second.join().unwrap();
}

#[test]
fn test_server_hangup_disconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        expect_line(&mut reader, "connect alice budget");
        send(&mut writer, "connected 0\n");
    });

    let recorder = Arc::new(Recorder::default());
    let mut comm = communicator(&recorder);
    comm.connect(addr, "alice", "budget").unwrap();
    recorder.wait_for("ready", |e| e.contains(&Event::Ready));
    server.join().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while comm.is_connected() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!comm.is_connected());
    assert_eq!(comm.state(), SyncState::Disconnected);
    assert!(matches!(comm.edit_cell("A1", "1"), Err(ClientError::NotConnected)));
    comm.close();
}

#[test]
fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let recorder = Arc::new(Recorder::default());
    let mut comm = communicator(&recorder);
    assert!(matches!(
        comm.connect(addr, "alice", "budget"),
        Err(ClientError::ConnectionFailed(_))
    ));
    assert!(!comm.is_connected());
}

#[test]
fn test_register_user_as_admin() {
    let (addr, server) = scripted_server(|reader, writer| {
        expect_line(reader, "connect sysadmin budget");
        send(writer, "connected 0\n");
        expect_line(reader, "register carol");
    });

    register_user_as_admin(addr, "carol", "budget", &ClientConfig::default()).unwrap();
    assert!(server.join().unwrap().is_empty());
}

#[test]
fn test_register_user_as_admin_already_registered() {
    let (addr, server) = scripted_server(|reader, writer| {
        expect_line(reader, "connect sysadmin budget");
        expect_line(reader, "register carol");
        send(writer, "connected 0\nerror 4 The username you are trying to register is already registered.\n");
    });

    register_user_as_admin(addr, "carol", "budget", &ClientConfig::default()).unwrap();
    server.join().unwrap();
}

#[test]
fn test_register_user_as_admin_load_failure() {
    let (addr, server) = scripted_server(|reader, writer| {
        expect_line(reader, "connect sysadmin budget");
        send(writer, "error 0 The spreadsheet could not be loaded correctly.\n");
    });

    let err = register_user_as_admin(addr, "carol", "budget", &ClientConfig::default()).unwrap_err();
    assert!(matches!(err, ClientError::Server { code: ErrorCode::Generic, .. }));
    server.join().unwrap();
}
