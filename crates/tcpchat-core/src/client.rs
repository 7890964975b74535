//! Client identity types.

use std::fmt;
use std::net::SocketAddr;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for one accepted connection.
///
/// Assigned by the listener from a monotonically increasing counter and
/// never reused within a process. Two connections that happen to share
/// a peer address (the OS may reuse an ephemeral port) still get distinct
/// ids, which is why broadcast exclusion compares ids and not addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Creates a ClientId from a raw counter value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw counter value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Client Info
// ============================================================================

/// What the relay knows about a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientInfo {
    /// Connection handle, the only identity used for delivery decisions
    pub id: ClientId,

    /// Peer address as reported by `accept`
    pub peer: SocketAddr,
}

impl ClientInfo {
    pub fn new(id: ClientId, peer: SocketAddr) -> Self {
        Self { id, peer }
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.peer)
    }
}
