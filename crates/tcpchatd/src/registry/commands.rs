//! Registry actor commands, errors, and delivery reports.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `BroadcastReport`: Outcome of one delivery round
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use tcpchat_core::{ClientId, ClientInfo, Message};
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Write half of a client connection, owned by the registry.
///
/// Boxed so the registry can hold TCP write halves in production and
/// in-memory pipes in tests.
pub type ClientWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response, so callers
/// observe the registry state exactly as the actor left it after
/// processing their command.
pub enum RegistryCommand {
    /// Admit a freshly accepted client.
    ///
    /// # Errors
    /// - `RegistryError::ClientAlreadyExists` if the id is already registered
    Insert {
        /// Identity and peer address of the client
        client: ClientInfo,
        /// Write half used for deliveries
        writer: ClientWriter,
        /// Token that keeps the client's read task alive; cancelled on removal
        watch: CancellationToken,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove a client whose connection ended.
    ///
    /// # Errors
    /// - `RegistryError::ClientNotFound` if the client was already removed
    Remove {
        /// ID of the client to remove
        client_id: ClientId,
        /// Why the client is leaving
        reason: RemovalReason,
        /// Channel to send the removed client
        respond_to: oneshot::Sender<Result<ClientInfo, RegistryError>>,
    },

    /// Deliver a message to every client except its origin.
    ///
    /// # Errors
    /// - `RegistryError::Delivery` on a write error that is neither
    ///   interrupted, broken pipe nor reset
    Broadcast {
        /// The sanitized message and its origin
        message: Message,
        /// Channel to send the delivery report
        respond_to: oneshot::Sender<Result<BroadcastReport, RegistryError>>,
    },

    /// Get the current membership in id order.
    Snapshot {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<ClientInfo>>,
    },

    /// Check whether a client is registered.
    Contains {
        /// ID of the client to look up
        client_id: ClientId,
        /// Channel to send the result
        respond_to: oneshot::Sender<bool>,
    },
}

impl fmt::Debug for RegistryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert { client, .. } => f.debug_struct("Insert").field("client", client).finish(),
            Self::Remove {
                client_id, reason, ..
            } => f
                .debug_struct("Remove")
                .field("client_id", client_id)
                .field("reason", reason)
                .finish(),
            Self::Broadcast { message, .. } => f
                .debug_struct("Broadcast")
                .field("message", message)
                .finish(),
            Self::Snapshot { .. } => f.write_str("Snapshot"),
            Self::Contains { client_id, .. } => f
                .debug_struct("Contains")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested client is not registered.
    #[error("client not found: {0}")]
    ClientNotFound(ClientId),

    /// A client with this id is already registered.
    #[error("client already exists: {0}")]
    ClientAlreadyExists(ClientId),

    /// The actor stopped before answering.
    #[error("response channel closed")]
    ChannelClosed,

    /// Writing to a recipient failed in a way the relay cannot recover from.
    #[error("delivery to {peer} ({client}) failed: {source}")]
    Delivery {
        client: ClientId,
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Reason why a client was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The peer closed its side (zero-length read).
    PeerClosed,

    /// The connection was reset.
    Reset,

    /// A write found the connection already shut down.
    BrokenPipe,
}

impl RemovalReason {
    /// Maps a peer-lifecycle I/O error to a removal reason.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe => Self::BrokenPipe,
            _ => Self::Reset,
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "closed by peer"),
            Self::Reset => write!(f, "connection reset"),
            Self::BrokenPipe => write!(f, "broken pipe"),
        }
    }
}

// ============================================================================
// Broadcast Report
// ============================================================================

/// Outcome of one broadcast round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients that received the message, in delivery order
    pub delivered: Vec<ClientId>,

    /// Clients removed because delivery found them gone
    pub evicted: Vec<ClientId>,
}

impl BroadcastReport {
    /// Number of clients that received the message.
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    /// Returns true if `id` received the message.
    pub fn reached(&self, id: ClientId) -> bool {
        self.delivered.contains(&id)
    }
}
