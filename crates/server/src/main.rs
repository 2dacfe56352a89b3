// gridsync-server - host shared sheets for gridsync clients

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gridsync_server::{ServerConfig, ServerError, SheetServer, UserRegistry};

#[derive(Parser)]
#[command(name = "gridsync-server")]
#[command(about = "Host shared GridSync sheets")]
#[command(version)]
struct Cli {
    /// Interface to listen on (overrides the config file)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, 0 for any free port (overrides the config file)
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Directory holding sheet documents and the users file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Users file (relative paths resolve against the data directory)
    #[arg(long)]
    users_file: Option<PathBuf>,

    /// Config file (default: <config dir>/gridsync/server.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Register a user before starting (repeatable)
    #[arg(long = "add-user", value_name = "USER")]
    add_users: Vec<String>,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<ServerConfig, ServerError> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::load_default()?,
    };
    if let Some(bind) = &cli.bind {
        config.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(file) = &cli.users_file {
        config.users_file = file.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), ServerError> {
    let config = load_config(&cli)?;

    if !cli.add_users.is_empty() {
        let mut users = UserRegistry::load(config.users_path())?;
        for user in &cli.add_users {
            if !users.register(user)? {
                log::info!("{} is already registered", user);
            }
        }
    }

    let mut server = SheetServer::new(config);
    server.start()?;
    if let Some(addr) = server.bound_addr() {
        println!("listening on {}", addr);
    }
    server.wait();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "gridsync-server",
            "--port",
            "0",
            "--data-dir",
            "/tmp/sheets",
            "--add-user",
            "alice",
            "--add-user",
            "bob",
        ]);
        assert_eq!(cli.add_users, vec!["alice", "bob"]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "port = 4000\nmax_parse_failures = 5\n").unwrap();
        let cli = Cli { config: Some(path), ..cli };

        let config = load_config(&cli).unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.max_parse_failures, 5);
        assert_eq!(config.users_path(), PathBuf::from("/tmp/sheets/users"));
    }
}
