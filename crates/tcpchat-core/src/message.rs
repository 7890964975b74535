//! Messages handed to the broadcaster.

use crate::client::{ClientId, ClientInfo};
use crate::sanitize::Line;

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Typed at the server's own console; delivered to every client.
    Operator,

    /// Read from a connected client; delivered to everyone else.
    Client(ClientInfo),
}

impl Origin {
    /// The client that must not receive this message, if any.
    pub fn excluded(&self) -> Option<ClientId> {
        match self {
            Self::Operator => None,
            Self::Client(info) => Some(info.id),
        }
    }
}

/// A sanitized line together with its origin.
///
/// Lives for exactly one delivery round; nothing is queued or retried
/// once the broadcast completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub line: Line,
    pub origin: Origin,
}

impl Message {
    pub fn new(line: Line, origin: Origin) -> Self {
        Self { line, origin }
    }

    /// Message typed by the operator.
    pub fn from_operator(line: Line) -> Self {
        Self::new(line, Origin::Operator)
    }

    /// Message read from `client`.
    pub fn from_client(line: Line, client: ClientInfo) -> Self {
        Self::new(line, Origin::Client(client))
    }

    /// Returns true if `id` should receive this message.
    pub fn is_for(&self, id: ClientId) -> bool {
        self.origin.excluded() != Some(id)
    }
}
