//! tcpchat server - Broadcast chat relay
//!
//! Accepts TCP clients on the given port and relays every line a client
//! sends to all other connected clients. Lines typed on stdin are relayed
//! to everyone.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:9000
//! tcpchat-server 9000
//!
//! # Listen on loopback only
//! TCPCHAT_BIND=127.0.0.1 tcpchat-server 9000
//!
//! # Enable debug logging (stderr)
//! RUST_LOG=tcpchatd=debug tcpchat-server 9000
//! ```
//!
//! stdout carries only the chat transcript; logs go to stderr.
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown
//! - SIGHUP/SIGUSR1/SIGUSR2/SIGQUIT: Logged and ignored
//! - EOF on stdin: Graceful shutdown

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tcpchatd::config::{parse_port, ServerConfig};
use tcpchatd::registry::spawn_registry;
use tcpchatd::server::ChatServer;
use tcpchatd::transcript::Transcript;

/// tcpchat server - relays each client's lines to every other client
#[derive(Parser, Debug)]
#[command(name = "tcpchat-server", version, about)]
struct Args {
    /// Port to listen on (1024-65535)
    #[arg(value_name = "LOCAL_PORT", value_parser = parse_port)]
    port: u16,
}

/// Parses the command line, exiting with status 1 on a usage error.
fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            process::exit(1);
        }
        // --help and --version
        Err(e) => e.exit(),
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tcpchatd=info".parse()?)
                .add_directive("tcpchat_core=info".parse()?)
                .add_directive("tcpchat_server=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args();
    init_logging()?;

    let config = ServerConfig::from_env(args.port).context("Invalid server configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    let result = runtime.block_on(run_server(config));

    // The stdin reader sits in a blocking read that cannot be cancelled.
    runtime.shutdown_background();

    if let Err(e) = &result {
        error!(error = %e, "tcpchat server exiting");
    }
    result
}

/// Runs the server (async entry point).
async fn run_server(config: ServerConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "tcpchat server starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown_token.cancel();
            }
            Err(e) => error!(error = %e, "Error waiting for shutdown signal"),
        }
    });

    // Spawn the client registry
    let registry = spawn_registry(Transcript::stdout());
    info!("Client registry started");

    let server = ChatServer::bind(&config, registry, cancel_token)
        .with_context(|| format!("Failed to listen on {}", config.bind_addr))?;

    info!(addr = %server.local_addr(), "Starting server");

    server
        .run(tokio::io::stdin())
        .await
        .context("Chat server stopped with an error")?;

    info!("tcpchat server stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
///
/// Other common signals are logged and otherwise ignored.
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigusr1 = signal(SignalKind::user_defined1())?;
        let mut sigusr2 = signal(SignalKind::user_defined2())?;
        let mut sigquit = signal(SignalKind::quit())?;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    break;
                }
                _ = sighup.recv() => info!("Ignoring SIGHUP"),
                _ = sigusr1.recv() => info!("Ignoring SIGUSR1"),
                _ = sigusr2.recv() => info!("Ignoring SIGUSR2"),
                _ = sigquit.recv() => info!("Ignoring SIGQUIT"),
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_cli_accepts_valid_port() {
        let args = Args::try_parse_from(["tcpchat-server", "9000"]).unwrap();
        assert_eq!(args.port, 9000);
    }

    #[test]
    fn test_cli_rejects_bad_ports() {
        assert!(Args::try_parse_from(["tcpchat-server", "80"]).is_err());
        assert!(Args::try_parse_from(["tcpchat-server", "70000"]).is_err());
        assert!(Args::try_parse_from(["tcpchat-server", "chat"]).is_err());
        assert!(Args::try_parse_from(["tcpchat-server"]).is_err());
    }
}
