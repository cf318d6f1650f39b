//! Line-echo server exercising the full server surface: TLS termination,
//! config loading and every dispatch strategy.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use tlserve::config::{load_config, validate_config, DispatchConfig, DispatchStrategy, TlsConfig};
use tlserve::net::Connection;
use tlserve::observability::init_logging;
use tlserve::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "echo-server")]
#[command(about = "TLS-capable echo server", long_about = None)]
struct Cli {
    /// Load settings from a TOML config file instead of flags.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "127.0.0.1:4433")]
    bind: String,

    /// PEM certificate chain. Requires --key; omit both for plaintext.
    #[arg(long)]
    cert: Option<PathBuf>,

    /// PEM private key.
    #[arg(long)]
    key: Option<PathBuf>,

    /// sequential | threaded | forking | pool
    #[arg(short, long, default_value = "sequential")]
    strategy: DispatchStrategy,

    /// Worker count for the pool strategy (0 = number of CPUs).
    #[arg(long, default_value_t = 0)]
    pool_workers: usize,
}

fn echo(mut conn: Connection, peer: SocketAddr) -> std::io::Result<()> {
    tracing::info!(peer = %peer, tls = conn.is_tls(), "Echoing");

    let mut buf = [0u8; 1024];
    loop {
        let n = match conn.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            // peer hung up without a clean TLS close
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        conn.write_all(&buf[..n])?;
        conn.flush()?;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("tlserve=debug,echo_server=debug");

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let tls = match (&cli.cert, &cli.key) {
                (Some(cert), Some(key)) => Some(TlsConfig {
                    cert_path: cert.display().to_string(),
                    key_path: key.display().to_string(),
                }),
                (None, None) => None,
                _ => return Err("--cert and --key must be given together".into()),
            };
            let config = ServerConfig {
                bind_address: cli.bind.clone(),
                tls,
                dispatch: DispatchConfig {
                    strategy: cli.strategy,
                    pool_workers: cli.pool_workers,
                },
                ..Default::default()
            };
            if let Err(errors) = validate_config(&config) {
                for error in &errors {
                    tracing::error!(%error, "Invalid configuration");
                }
                return Err("invalid configuration".into());
            }
            config
        }
    };

    let server = Server::from_config(&config, echo)?;

    tracing::info!(
        address = ?server.local_addr(),
        strategy = %config.dispatch.strategy,
        "Echo server ready"
    );

    server.serve_forever()?;
    Ok(())
}
