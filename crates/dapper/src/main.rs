//! Dapper adapter entry point.
//!
//! Speaks DAP over stdio by default (the transport every client assumes
//! without extra configuration), or over a TCP socket for clients that
//! prefer to dial out to an already-running adapter.

use clap::Parser;
use dapper::Session;
use std::io;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// Dapper Debug Adapter Protocol engine
#[derive(Parser, Debug)]
#[command(name = "dapper", version, about, long_about = None)]
struct Args {
    /// Use stdio for communication (default)
    #[arg(long, default_value_t = true)]
    stdio: bool,

    /// Use a TCP socket for communication instead of stdio
    #[arg(long, conflicts_with = "stdio")]
    socket: bool,

    /// Port to listen on (for socket mode)
    #[arg(long, default_value_t = 4711)]
    port: u16,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    tracing::info!("dapper: Debug Adapter Protocol engine starting");
    let session = Session::new();

    let result = if args.socket {
        run_socket(&session, args.port).await
    } else {
        run_stdio(&session).await
    };

    match result {
        Ok(()) => {
            tracing::info!("session ended cleanly");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "session ended with a fatal transport/framing error");
            Err(e.into())
        }
    }
}

async fn run_stdio(session: &Session) -> Result<(), dapper::error::DapperError> {
    tracing::info!("listening on stdio");
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    session.run(stdin, stdout).await
}

async fn run_socket(session: &Session, port: u16) -> Result<(), dapper::error::DapperError> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| dapper::error::DapperError::Transport(format!("socket bind failed: {e}")))?;
    let local = listener.local_addr().map_err(|e| dapper::error::DapperError::Transport(e.to_string()))?;
    tracing::info!(addr = %local, "listening on tcp socket");

    let (stream, peer) = listener
        .accept()
        .await
        .map_err(|e| dapper::error::DapperError::Transport(format!("socket accept failed: {e}")))?;
    tracing::info!(%peer, "client connected");

    let (reader, writer) = stream.into_split();
    session.run(reader, writer).await
}
