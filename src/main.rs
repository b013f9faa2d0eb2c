//! QuartzKV server entry point.
//!
//! Parses the command line, wires up the engine, the expiry reaper and
//! the TCP listener, then accepts clients until interrupted.

use quartzkv::commands::CommandHandler;
use quartzkv::connection::{handle_connection, ConnectionStats};
use quartzkv::storage::{ExpiryReaper, StorageEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: quartzkv::DEFAULT_HOST.to_string(),
            port: quartzkv::DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Parses configuration from command-line arguments.
    ///
    /// The port can be given either as the first positional argument
    /// (`quartzkv 6380`) or via `--port`; the bind host via `--host`.
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = parse_port(&args[i + 1]);
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("QuartzKV version {}", quartzkv::VERSION);
                    std::process::exit(0);
                }
                arg if !arg.starts_with('-') => {
                    config.port = parse_port(arg);
                    i += 1;
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string.
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_port(raw: &str) -> u16 {
    match raw.parse::<u16>() {
        Ok(port) if port >= 1 => port,
        _ => {
            eprintln!("Error: invalid port number '{raw}' (expected 1-65535)");
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
QuartzKV - An In-Memory Key-Value Store with TTL and Sorted Sets

USAGE:
    quartzkv [PORT] [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 6379)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    quartzkv                       # Start on 127.0.0.1:6379
    quartzkv 6380                  # Start on port 6380
    quartzkv --host 0.0.0.0        # Listen on all interfaces

CONNECTING:
    Use redis-cli, netcat or any Redis client:
    $ redis-cli -p 6379
    127.0.0.1:6379> SET name quartz
    OK
    127.0.0.1:6379> GET name
    "quartz"
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    // The engine is shared by every connection task and the reaper.
    let engine = Arc::new(StorageEngine::new());
    let _reaper = ExpiryReaper::start(Arc::clone(&engine));

    let stats = Arc::new(ConnectionStats::new());

    // A failed bind is a start-up failure: the error propagates out of
    // main and the process exits non-zero.
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("QuartzKV v{} listening on {}", quartzkv::VERSION, config.bind_address());

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("shutdown signal received, stopping server");
    };

    tokio::select! {
        _ = accept_loop(listener, engine, stats) => {}
        _ = shutdown => {}
    }

    // Dropping the reaper handle stops the background task.
    info!("server shutdown complete");
    Ok(())
}

/// Accepts clients forever, one handler task each.
async fn accept_loop(
    listener: TcpListener,
    engine: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let commands = CommandHandler::new(Arc::clone(&engine));
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    handle_connection(stream, addr, commands, stats).await;
                });
            }
            Err(err) => {
                error!("failed to accept connection: {err}");
            }
        }
    }
}
