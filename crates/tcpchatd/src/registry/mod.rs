//! Client registry using Actor pattern.
//!
//! The registry is the authoritative live set of connected clients. It
//! receives commands via a tokio mpsc channel, owns every client's write
//! half, and performs each broadcast itself, so admission, removal and
//! delivery are totally ordered.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Listener /      │────▶│  RegistryActor  │────▶│ Transcript       │
//! │ Connection tasks│     │                 │     │ (stdout notices) │
//! └─────────────────┘     └────────┬────────┘     └──────────────────┘
//!         │                        │
//!         │  RegistryCommand       │  BTreeMap<ClientId, ClientEntry>
//!         │  (mpsc channel)        │  write halves + watch tokens
//!         ▼                        ▼
//!   Insert/Remove/           Deliver to all clients
//!   Broadcast                 but the origin
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{
    BroadcastReport, ClientWriter, RegistryCommand, RegistryError, RemovalReason,
};
pub use handle::RegistryHandle;

use crate::transcript::Transcript;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command channel
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Returns a RegistryHandle for client use
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use tcpchatd::registry::spawn_registry;
/// use tcpchatd::transcript::Transcript;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(Transcript::stdout());
///
///     let clients = handle.snapshot().await;
///     assert!(clients.is_empty());
/// }
/// ```
pub fn spawn_registry(transcript: Transcript) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, transcript);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
