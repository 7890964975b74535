//! Registry actor - owns all client state and runs every broadcast.
//!
//! The RegistryActor is the single owner of the client set and of every
//! client's write half. It receives commands via an mpsc channel and
//! answers each one over its oneshot.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::BTreeMap;
use std::io;

use tcpchat_core::{ClientId, ClientInfo, IoDisposition, Message, Origin};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::commands::{
    BroadcastReport, ClientWriter, RegistryCommand, RegistryError, RemovalReason,
};
use crate::transcript::Transcript;

/// One registered client.
struct ClientEntry {
    info: ClientInfo,

    /// Write half used for deliveries; dropped on removal
    writer: ClientWriter,

    /// Keeps the client's read task alive; cancelled on removal
    watch: CancellationToken,
}

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all client state.
///
/// Implements the actor pattern: receives commands via mpsc channel and
/// processes them sequentially. The client set has no size limit.
///
/// # Ownership
///
/// The actor owns:
/// - `clients`: map of registered clients keyed by connection id. Ids are
///   handed out in accept order, so map order is admission order.
/// - `transcript`: the stdout notices, written in processing order
///
/// # Registry / watch coherence
///
/// A client's read task only runs while its `watch` token is live, and
/// the token is cancelled in the same step that removes the entry. A
/// message from a client that is no longer registered is dropped.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Registered clients keyed by connection id
    clients: BTreeMap<ClientId, ClientEntry>,

    /// Connect / relay / disconnect notices
    transcript: Transcript,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `transcript` - Where connect, relay and disconnect notices go
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, transcript: Transcript) -> Self {
        Self {
            receiver,
            clients: BTreeMap::new(),
            transcript,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!(clients = self.clients.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    async fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Insert {
                client,
                writer,
                watch,
                respond_to,
            } => {
                let result = self.handle_insert(client, writer, watch);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove {
                client_id,
                reason,
                respond_to,
            } => {
                let result = self.handle_remove(client_id, reason);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Broadcast {
                message,
                respond_to,
            } => {
                let result = self.handle_broadcast(message).await;
                let _ = respond_to.send(result);
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.handle_snapshot());
            }
            RegistryCommand::Contains {
                client_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.clients.contains_key(&client_id));
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles admission of a newly accepted client.
    fn handle_insert(
        &mut self,
        client: ClientInfo,
        writer: ClientWriter,
        watch: CancellationToken,
    ) -> Result<(), RegistryError> {
        if self.clients.contains_key(&client.id) {
            debug!(client_id = %client.id, "Client already registered, rejecting");
            return Err(RegistryError::ClientAlreadyExists(client.id));
        }

        self.clients.insert(
            client.id,
            ClientEntry {
                info: client,
                writer,
                watch,
            },
        );
        self.transcript.connected(&client);

        info!(
            client_id = %client.id,
            peer = %client.peer,
            total_clients = self.clients.len(),
            "Client registered"
        );

        Ok(())
    }

    /// Handles removal requested by a client's read task.
    fn handle_remove(
        &mut self,
        client_id: ClientId,
        reason: RemovalReason,
    ) -> Result<ClientInfo, RegistryError> {
        self.evict(client_id, reason)
            .ok_or(RegistryError::ClientNotFound(client_id))
    }

    /// Delivers a message to every registered client except its origin.
    ///
    /// Recipients are fixed from a snapshot of ids taken when the round
    /// starts; clients evicted along the way are skipped, clients admitted
    /// later are not part of this round.
    async fn handle_broadcast(
        &mut self,
        message: Message,
    ) -> Result<BroadcastReport, RegistryError> {
        if let Origin::Client(sender) = message.origin {
            if !self.clients.contains_key(&sender.id) {
                debug!(
                    client_id = %sender.id,
                    "Dropping message from client that already left"
                );
                return Ok(BroadcastReport::default());
            }
            self.transcript.relayed(&sender, &message.line);
        }

        let recipients: Vec<ClientId> = self
            .clients
            .keys()
            .copied()
            .filter(|id| message.is_for(*id))
            .collect();

        let mut report = BroadcastReport::default();

        for id in recipients {
            let Some(entry) = self.clients.get_mut(&id) else {
                continue;
            };
            let info = entry.info;

            let result = deliver(&mut entry.writer, message.line.as_bytes()).await;
            let err = match result {
                Ok(()) => {
                    report.delivered.push(id);
                    continue;
                }
                Err(err) => err,
            };

            match IoDisposition::of(&err) {
                IoDisposition::PeerGone => {
                    debug!(
                        client_id = %id,
                        peer = %info.peer,
                        error = %err,
                        "Delivery found client gone"
                    );
                    self.evict(id, RemovalReason::from_io(&err));
                    report.evicted.push(id);
                }
                IoDisposition::Retry | IoDisposition::Fatal => {
                    error!(
                        client_id = %id,
                        peer = %info.peer,
                        error = %err,
                        "Delivery failed"
                    );
                    return Err(RegistryError::Delivery {
                        client: id,
                        peer: info.peer,
                        source: err,
                    });
                }
            }
        }

        debug!(
            origin = ?message.origin,
            delivered = report.delivered.len(),
            evicted = report.evicted.len(),
            "Broadcast complete"
        );

        Ok(report)
    }

    /// Handles getting all clients.
    fn handle_snapshot(&self) -> Vec<ClientInfo> {
        self.clients.values().map(|entry| entry.info).collect()
    }

    /// Removes a client, cancels its watch and announces the departure.
    fn evict(&mut self, client_id: ClientId, reason: RemovalReason) -> Option<ClientInfo> {
        let entry = self.clients.remove(&client_id)?;
        entry.watch.cancel();

        let client = entry.info;
        self.transcript.disconnected(&client);

        info!(
            client_id = %client.id,
            peer = %client.peer,
            reason = %reason,
            total_clients = self.clients.len(),
            "Client removed"
        );

        Some(client)
    }

    /// Returns the number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// Writes `bytes` to one recipient.
///
/// An interrupted write is retried from where it stopped, so a retry
/// never duplicates bytes already accepted by the socket.
async fn deliver(writer: &mut ClientWriter, bytes: &[u8]) -> io::Result<()> {
    let mut remaining = bytes;

    while !remaining.is_empty() {
        match writer.write(remaining).await {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => remaining = remaining.get(n..).unwrap_or_default(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    loop {
        match writer.flush().await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
