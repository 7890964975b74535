//! TCP chat server for the relay daemon.
//!
//! The server:
//! - Listens on a TCP socket for chat clients
//! - Admits each client into the registry and spawns a ConnectionHandler
//! - Relays operator console lines to every client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │   ChatServer    │◀────│ Console task    │
//! │  (event loop)   │     │ (operator lines)│
//! │   TcpListener   │     └─────────────────┘
//! └───────┬─────────┘
//!         │ accept() + insert
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │──▶ all other clients
//! │   (per client)  │     │   (broadcast)   │
//! └─────────────────┘     └─────────────────┘
//!         │
//!         │ fatal errors
//!         ▼
//!     ChatServer
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?` or pattern matching
//! - Peer failures evict one client; only fatal errors end the loop

mod connection;
mod console;
mod listener;

pub use connection::{ConnectionHandler, HandlerExit};
pub use console::{spawn_console, ConsoleInput, CONSOLE_BUFFER, LINE_LIMIT};
pub use listener::bind_listener;

use std::fmt;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};

use tcpchat_core::{sanitize, ClientId, ClientInfo, DomainError, Message, MAX_MESSAGE_LEN};
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::registry::{BroadcastReport, RegistryError, RegistryHandle};

/// Pending fatal reports from connection tasks.
const FATAL_BUFFER: usize = 8;

/// State of the server's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Accepting connections and console input.
    Running,

    /// Shutdown requested; no more accepts or reads.
    Draining,

    /// Listener closed and every client watch cancelled.
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// What moved the loop out of `Running` without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// The shutdown token was cancelled.
    Shutdown,

    /// The operator console reached end of input.
    ConsoleEof,
}

impl fmt::Display for DrainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "shutdown requested"),
            Self::ConsoleEof => write!(f, "console closed"),
        }
    }
}

/// TCP chat server.
///
/// Owns the listening socket and drives the event loop. Client state lives
/// in the registry actor.
pub struct ChatServer {
    /// Bound listening socket
    listener: TcpListener,

    /// Address the listener actually bound
    local_addr: SocketAddr,

    /// Handle to the client registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown; parent of every client watch
    cancel_token: CancellationToken,

    /// Counter for generating client IDs
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the socket cannot be set up.
    pub fn bind(
        config: &ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = bind_listener(config)?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;

        Ok(Self {
            listener,
            local_addr,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(1),
        })
    }

    /// Returns the bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the event loop until shutdown, console EOF, or a fatal error.
    ///
    /// `console` is the operator input; each line is broadcast to every
    /// client. On return the listener is closed and every client watch
    /// has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: a failed accept, an unrecoverable
    /// read or delivery error, a console read error, or a registry failure.
    pub async fn run<R>(self, console: R) -> Result<(), ServerError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<ServerError>(FATAL_BUFFER);
        let mut console = spawn_console(console, self.cancel_token.clone());
        let mut state = LoopState::Running;

        info!(addr = %self.local_addr, state = %state, "Chat server started");

        let outcome: Result<DrainReason, ServerError> = loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break Ok(DrainReason::Shutdown),

                Some(err) = fatal_rx.recv() => break Err(err),

                result = self.listener.accept() => {
                    match listener::accepted(result) {
                        Ok(Some((stream, peer))) => {
                            if let Err(e) = self.admit(stream, peer, &fatal_tx).await {
                                break Err(e);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => break Err(e),
                    }
                }

                input = console.recv() => {
                    match input {
                        Some(ConsoleInput::Line(raw)) => {
                            if let Err(e) = relay_operator_line(&self.registry, &raw).await {
                                break Err(e.into());
                            }
                        }
                        Some(ConsoleInput::Oversized) => {
                            warn!(max = MAX_MESSAGE_LEN, "Discarding oversized console line");
                        }
                        Some(ConsoleInput::Eof) | None => break Ok(DrainReason::ConsoleEof),
                        Some(ConsoleInput::Failed(e)) => break Err(ServerError::Console(e)),
                    }
                }
            }
        };

        state = transition(state, LoopState::Draining);
        match &outcome {
            Ok(reason) => info!(reason = %reason, "Draining chat server"),
            Err(e) => error!(error = %e, "Chat server failed"),
        }

        self.cancel_token.cancel();
        drop(self.listener);
        transition(state, LoopState::Stopped);

        outcome.map(|_| ())
    }

    /// Admits one accepted connection and starts watching it.
    ///
    /// The client is in the registry before its handler reads anything.
    async fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        fatal: &mpsc::Sender<ServerError>,
    ) -> Result<(), ServerError> {
        let id = ClientId::new(self.connection_counter.fetch_add(1, Ordering::Relaxed));
        let client = ClientInfo::new(id, peer);
        let (reader, writer) = stream.into_split();
        let watch = self.cancel_token.child_token();

        self.registry
            .insert(client, Box::new(writer), watch.clone())
            .await?;

        let handler =
            ConnectionHandler::new(reader, client, self.registry.clone(), watch, fatal.clone());
        tokio::spawn(handler.run());

        Ok(())
    }
}

fn transition(from: LoopState, to: LoopState) -> LoopState {
    debug!(from = %from, to = %to, "Event loop state change");
    to
}

/// Sanitizes one operator line and broadcasts it to every client.
///
/// Returns `Ok(None)` when the line was discarded: nothing printable, or
/// longer than the message limit.
///
/// # Errors
///
/// Propagates registry errors from the broadcast.
pub async fn relay_operator_line(
    registry: &RegistryHandle,
    raw: &[u8],
) -> Result<Option<BroadcastReport>, RegistryError> {
    let line = match sanitize(raw) {
        Ok(Some(line)) => line,
        Ok(None) => return Ok(None),
        Err(DomainError::MessageTooLong { len, max }) => {
            warn!(len, max, "Discarding oversized console line");
            return Ok(None);
        }
    };

    let report = registry.broadcast(Message::from_operator(line)).await?;
    debug!(
        delivered = report.delivered_count(),
        evicted = report.evicted.len(),
        "Relayed console line"
    );
    Ok(Some(report))
}

/// Errors that end the server's event loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddrV4,
        source: io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Failed to read from {peer}: {source}")]
    Read { peer: SocketAddr, source: io::Error },

    #[error("Failed to read console: {0}")]
    Console(#[source] io::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
