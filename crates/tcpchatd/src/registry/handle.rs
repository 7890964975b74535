//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tcpchat_core::{ClientId, ClientInfo, Message};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::commands::{
    BroadcastReport, ClientWriter, RegistryCommand, RegistryError, RemovalReason,
};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// // Admit a client right after accept
/// handle.insert(client, Box::new(write_half), watch.clone()).await?;
///
/// // Relay a line to everyone but its sender
/// let report = handle.broadcast(Message::from_client(line, client)).await?;
///
/// // Drop the client once its read side ends
/// handle.remove(client.id, RemovalReason::PeerClosed).await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Admit a newly accepted client.
    ///
    /// The caller must not start reading from the client before this
    /// returns `Ok`, and must stop reading once `watch` is cancelled.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ClientAlreadyExists` if the id is already registered
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn insert(
        &self,
        client: ClientInfo,
        writer: ClientWriter,
        watch: CancellationToken,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Insert {
                client,
                writer,
                watch,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove a client whose connection ended.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ClientNotFound` if the client is no longer registered
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn remove(
        &self,
        client_id: ClientId,
        reason: RemovalReason,
    ) -> Result<ClientInfo, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Remove {
                client_id,
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Deliver a message to every registered client except its origin.
    ///
    /// Clients found closed or reset during delivery are removed and
    /// listed in the report; delivery to the others carries on.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Delivery` on an unrecoverable write error
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn broadcast(&self, message: Message) -> Result<BroadcastReport, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Broadcast {
                message,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Get all registered clients in id order.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn snapshot(&self) -> Vec<ClientInfo> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of registered clients (0 if the actor is gone).
    pub async fn client_count(&self) -> usize {
        self.snapshot().await.len()
    }

    /// Check whether a client is registered.
    ///
    /// Returns `false` if communication with the actor fails.
    pub async fn contains(&self, client_id: ClientId) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Contains {
                client_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcpchat_core::sanitize;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let handle = RegistryHandle::new(cmd_tx);
        (handle, cmd_rx)
    }

    fn test_client(id: u64) -> ClientInfo {
        ClientInfo::new(ClientId::new(id), "127.0.0.1:50000".parse().unwrap())
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_insert_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Insert {
                client, respond_to, ..
            }) = rx.recv().await
            {
                assert_eq!(client.id, ClientId::new(1));
                let _ = respond_to.send(Ok(()));
                return true;
            }
            false
        });

        let (near, _far) = tokio::io::duplex(64);
        let result = handle
            .insert(test_client(1), Box::new(near), CancellationToken::new())
            .await;
        assert!(result.is_ok());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let (near, _far) = tokio::io::duplex(64);
        let result = handle
            .insert(test_client(1), Box::new(near), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_remove_sends_reason() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Remove {
                client_id,
                reason,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(client_id, ClientId::new(2));
                assert_eq!(reason, RemovalReason::Reset);
                let _ = respond_to.send(Ok(test_client(2)));
                return true;
            }
            false
        });

        let removed = handle.remove(ClientId::new(2), RemovalReason::Reset).await;
        assert_eq!(removed.unwrap(), test_client(2));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_broadcast_sends_message() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Broadcast {
                message,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(message.line.text(), "hi");
                let _ = respond_to.send(Ok(BroadcastReport::default()));
                return true;
            }
            false
        });

        let line = sanitize(b"hi").unwrap().unwrap();
        let report = handle.broadcast(Message::from_operator(line)).await;
        assert_eq!(report.unwrap(), BroadcastReport::default());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_returns_empty_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(handle.snapshot().await.is_empty());
        assert_eq!(handle.client_count().await, 0);
        assert!(!handle.contains(ClientId::new(1)).await);
    }
}
