// gridsync - join a shared sheet from the terminal
//
// Prints every refreshed cell, reads edits from stdin:
//   NAME CONTENTS     edit a cell (CONTENTS may be empty)
//   :undo             undo the last edit on the sheet
//   :register USER    register another user
//   :quit             disconnect and exit

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gridsync_client::{
    register_user_as_admin, ClientConfig, ClientError, Communicator, MirrorListener, SheetMirror,
};
use gridsync_engine::{NameRules, SharedSheet, Sheet, DEFAULT_VERSION};
use gridsync_protocol::ErrorCode;

#[derive(Parser)]
#[command(name = "gridsync")]
#[command(about = "Edit a shared GridSync sheet from the terminal")]
#[command(version)]
struct Cli {
    /// User name to connect as
    user: String,

    /// Sheet to join
    sheet: String,

    /// Server host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Config file (default: <config dir>/gridsync/client.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Register USER through the admin account before connecting
    #[arg(long)]
    register_as_admin: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

/// A line typed by the user.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Edit { name: &'a str, contents: &'a str },
    Undo,
    Register(&'a str),
    Quit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    if let Some(command) = line.strip_prefix(':') {
        let (word, arg) = command.split_once(' ').unwrap_or((command, ""));
        return match (word, arg.trim()) {
            ("quit" | "q", _) => Input::Quit,
            ("undo", _) => Input::Undo,
            ("register", user) if !user.is_empty() => Input::Register(user),
            _ => Input::Unknown(line),
        };
    }
    let (name, contents) = line.split_once(' ').unwrap_or((line, ""));
    Input::Edit { name, contents }
}

/// Prints what the mirror reports.
struct TerminalView {
    sheet: SharedSheet,
    json: bool,
}

impl TerminalView {
    fn emit(&self, text: String) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "{}", text);
        let _ = out.flush();
    }
}

impl MirrorListener for TerminalView {
    fn on_refresh(&self, cells: &[String]) {
        let rows: Vec<(String, String, String)> = {
            let sheet = self.sheet.lock();
            cells
                .iter()
                .map(|name| {
                    let contents = sheet.get_cell_contents(name).map(|c| c.to_input()).unwrap_or_default();
                    let value = sheet.get_cell_value(name).map(|v| v.to_string()).unwrap_or_default();
                    (name.clone(), contents, value)
                })
                .collect()
        };

        for (name, contents, value) in rows {
            if self.json {
                self.emit(
                    serde_json::json!({ "event": "cell", "name": name, "contents": contents, "value": value })
                        .to_string(),
                );
            } else {
                self.emit(format!("{} = {}", name, value));
            }
        }
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        if self.json {
            self.emit(
                serde_json::json!({ "event": "error", "code": code, "message": message }).to_string(),
            );
        } else {
            self.emit(format!("error {}: {}", code, message));
        }
    }

    fn on_ready(&self) {
        if self.json {
            self.emit(serde_json::json!({ "event": "ready" }).to_string());
        } else {
            self.emit("-- ready --".to_string());
        }
    }
}

fn run(cli: Cli) -> Result<(), ClientError> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::load_default()?,
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    let addr = config.addr();

    if cli.register_as_admin {
        register_user_as_admin(addr.as_str(), &cli.user, &cli.sheet, &config)?;
    }

    let sheet = Sheet::with_rules(NameRules::uppercase(), DEFAULT_VERSION).into_shared();
    let view = TerminalView { sheet: sheet.clone(), json: cli.json };
    let mirror = Arc::new(SheetMirror::new(sheet, view));

    let mut communicator = Communicator::new(mirror, config);
    communicator.connect(addr.as_str(), &cli.user, &cli.sheet)?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        match parse_input(line) {
            Input::Quit => break,
            Input::Undo => communicator.undo_last()?,
            Input::Register(user) => communicator.register_user(user)?,
            Input::Edit { name, contents } => communicator.edit_cell(name, contents)?,
            Input::Unknown(text) => eprintln!("unknown command: {}", text),
        }
    }

    communicator.close();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
