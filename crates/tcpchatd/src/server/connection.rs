//! Connection handler for individual chat clients.
//!
//! Each accepted connection gets its own `ConnectionHandler` that:
//! - Reads raw chunks from the client's read half
//! - Sanitizes them into lines
//! - Submits each line to the registry for broadcast
//! - Removes the client when the peer goes away
//!
//! The write half belongs to the registry, which is why the handler never
//! writes anything itself.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?` or pattern matching
//! - Unrecoverable errors are reported to the event loop, never raised here

use tcpchat_core::{sanitize, ClientInfo, DomainError, IoDisposition, Message, READ_CHUNK_LEN};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ServerError;
use crate::registry::{RegistryError, RegistryHandle, RemovalReason};

/// Why a connection handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerExit {
    /// The watch was cancelled: evicted by the registry or server shutdown.
    Unwatched,

    /// The peer went away and the handler removed the client.
    PeerGone(RemovalReason),

    /// A fatal error was reported to the event loop.
    Failed,
}

/// Reads from one client and feeds its lines to the registry.
pub struct ConnectionHandler<R> {
    /// Read half of the client's stream
    reader: R,

    /// The client this handler watches
    client: ClientInfo,

    /// Handle to the client registry
    registry: RegistryHandle,

    /// Cancelled when the client is removed or the server drains
    watch: CancellationToken,

    /// Channel for reporting fatal errors to the event loop
    fatal: mpsc::Sender<ServerError>,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a handler for a client that has already been admitted.
    pub fn new(
        reader: R,
        client: ClientInfo,
        registry: RegistryHandle,
        watch: CancellationToken,
        fatal: mpsc::Sender<ServerError>,
    ) -> Self {
        Self {
            reader,
            client,
            registry,
            watch,
            fatal,
        }
    }

    /// Runs the read loop until the client leaves, is evicted, or fails.
    pub async fn run(mut self) -> HandlerExit {
        let mut chunk = [0u8; READ_CHUNK_LEN];

        debug!(
            client_id = %self.client.id,
            peer = %self.client.peer,
            "Connection handler started"
        );

        let exit = loop {
            let result = tokio::select! {
                biased;
                _ = self.watch.cancelled() => break HandlerExit::Unwatched,
                result = self.reader.read(&mut chunk) => result,
            };

            match result {
                Ok(0) => break self.leave(RemovalReason::PeerClosed).await,
                Ok(n) => {
                    let Some(raw) = chunk.get(..n) else {
                        continue;
                    };
                    if let Err(e) = self.relay(raw).await {
                        break self.fail(e.into()).await;
                    }
                }
                Err(e) => match IoDisposition::of(&e) {
                    IoDisposition::Retry => continue,
                    IoDisposition::PeerGone => {
                        break self.leave(RemovalReason::from_io(&e)).await;
                    }
                    IoDisposition::Fatal => {
                        let err = ServerError::Read {
                            peer: self.client.peer,
                            source: e,
                        };
                        break self.fail(err).await;
                    }
                },
            }
        };

        debug!(client_id = %self.client.id, ?exit, "Connection handler finished");
        exit
    }

    /// Sanitizes one chunk and broadcasts it to everyone else.
    async fn relay(&self, raw: &[u8]) -> Result<(), RegistryError> {
        let line = match sanitize(raw) {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(client_id = %self.client.id, "Dropping chunk with nothing printable");
                return Ok(());
            }
            Err(DomainError::MessageTooLong { len, max }) => {
                warn!(
                    client_id = %self.client.id,
                    peer = %self.client.peer,
                    len,
                    max,
                    "Discarding oversized message"
                );
                return Ok(());
            }
        };

        let report = self
            .registry
            .broadcast(Message::from_client(line, self.client))
            .await?;

        debug!(
            client_id = %self.client.id,
            delivered = report.delivered_count(),
            evicted = report.evicted.len(),
            "Relayed message"
        );
        Ok(())
    }

    /// Removes this client after the peer went away.
    async fn leave(&self, reason: RemovalReason) -> HandlerExit {
        match self.registry.remove(self.client.id, reason).await {
            Ok(_) => {}
            Err(RegistryError::ClientNotFound(_)) => {
                // Already evicted by a broadcast.
                debug!(client_id = %self.client.id, "Client was already removed");
            }
            Err(e) => {
                debug!(client_id = %self.client.id, error = %e, "Failed to remove client");
            }
        }
        HandlerExit::PeerGone(reason)
    }

    async fn fail(&self, err: ServerError) -> HandlerExit {
        // The loop may already be gone if the server is shutting down.
        let _ = self.fatal.send(err).await;
        HandlerExit::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;
    use crate::transcript::{Transcript, TranscriptBuffer};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tcpchat_core::ClientId;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadBuf};

    fn client(id: u64) -> ClientInfo {
        ClientInfo::new(ClientId::new(id), format!("10.0.0.{id}:5000").parse().unwrap())
    }

    /// Registers a client whose writes land in the returned stream.
    async fn admit(registry: &RegistryHandle, id: u64) -> (DuplexStream, CancellationToken) {
        let (near, far) = tokio::io::duplex(4096);
        let watch = CancellationToken::new();
        registry
            .insert(client(id), Box::new(near), watch.clone())
            .await
            .unwrap();
        (far, watch)
    }

    struct ErroringReader(io::ErrorKind);

    impl AsyncRead for ErroringReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::from(self.0)))
        }
    }

    #[tokio::test]
    async fn test_relays_to_other_clients_and_leaves_on_eof() {
        let buffer = TranscriptBuffer::new();
        let registry = spawn_registry(Transcript::new(buffer.clone()));
        let (_a_out, a_watch) = admit(&registry, 1).await;
        let (mut b_out, _b_watch) = admit(&registry, 2).await;
        let (fatal_tx, _fatal_rx) = mpsc::channel(1);

        let (mut a_in, a_reader) = tokio::io::duplex(4096);
        let handler = ConnectionHandler::new(a_reader, client(1), registry.clone(), a_watch, fatal_tx);
        let task = tokio::spawn(handler.run());

        a_in.write_all(b"hello\r\n").await.unwrap();
        let mut received = [0u8; 6];
        tokio::io::AsyncReadExt::read_exact(&mut b_out, &mut received)
            .await
            .unwrap();
        assert_eq!(&received, b"hello\n");

        drop(a_in);
        assert_eq!(
            task.await.unwrap(),
            HandlerExit::PeerGone(RemovalReason::PeerClosed)
        );
        assert!(!registry.contains(ClientId::new(1)).await);
        assert!(buffer.contents().contains("10.0.0.1:5000 >> hello\n"));
    }

    #[tokio::test]
    async fn test_cancelled_watch_stops_handler() {
        let registry = spawn_registry(Transcript::sink());
        let (_out, watch) = admit(&registry, 1).await;
        let (fatal_tx, _fatal_rx) = mpsc::channel(1);
        let (_keep_open, reader) = tokio::io::duplex(64);

        let handler = ConnectionHandler::new(reader, client(1), registry.clone(), watch.clone(), fatal_tx);
        let task = tokio::spawn(handler.run());

        watch.cancel();
        assert_eq!(task.await.unwrap(), HandlerExit::Unwatched);
    }

    #[tokio::test]
    async fn test_reset_removes_client() {
        let buffer = TranscriptBuffer::new();
        let registry = spawn_registry(Transcript::new(buffer.clone()));
        let (_out, watch) = admit(&registry, 1).await;
        let (fatal_tx, _fatal_rx) = mpsc::channel(1);

        let reader = ErroringReader(io::ErrorKind::ConnectionReset);
        let exit = ConnectionHandler::new(reader, client(1), registry.clone(), watch.clone(), fatal_tx)
            .run()
            .await;

        assert_eq!(exit, HandlerExit::PeerGone(RemovalReason::Reset));
        assert!(watch.is_cancelled());
        assert!(!registry.contains(ClientId::new(1)).await);
        assert_eq!(
            buffer.contents(),
            "10.0.0.1:5000 connected\n10.0.0.1:5000 disconnected\n"
        );
    }

    #[tokio::test]
    async fn test_other_read_errors_are_reported() {
        let registry = spawn_registry(Transcript::sink());
        let (_out, watch) = admit(&registry, 1).await;
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);

        let reader = ErroringReader(io::ErrorKind::PermissionDenied);
        let exit = ConnectionHandler::new(reader, client(1), registry.clone(), watch, fatal_tx)
            .run()
            .await;

        assert_eq!(exit, HandlerExit::Failed);
        assert!(matches!(fatal_rx.recv().await, Some(ServerError::Read { .. })));
    }

    #[tokio::test]
    async fn test_unprintable_chunk_is_not_relayed() {
        let buffer = TranscriptBuffer::new();
        let registry = spawn_registry(Transcript::new(buffer.clone()));
        let (_a_out, a_watch) = admit(&registry, 1).await;
        let (_b_out, _b_watch) = admit(&registry, 2).await;
        let (fatal_tx, _fatal_rx) = mpsc::channel(1);

        let (mut a_in, a_reader) = tokio::io::duplex(64);
        let task = tokio::spawn(
            ConnectionHandler::new(a_reader, client(1), registry.clone(), a_watch, fatal_tx).run(),
        );

        a_in.write_all(b"\x01\x02\r\n").await.unwrap();
        drop(a_in);
        task.await.unwrap();

        assert!(!buffer.contents().contains(">>"));
    }
}
