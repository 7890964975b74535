//! Classification of socket I/O failures.
//!
//! Every read and write on a client connection ends up in one of three
//! buckets: try again in place, forget the peer, or stop the process.

use std::fmt;
use std::io;

/// What to do after an I/O error on a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDisposition {
    /// The call was interrupted; retry the same operation.
    Retry,

    /// The peer closed or reset the connection; evict that client only.
    PeerGone,

    /// Anything else; the relay cannot continue.
    Fatal,
}

impl IoDisposition {
    /// Classifies an I/O error.
    pub fn of(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::Interrupted => Self::Retry,
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => Self::PeerGone,
            _ => Self::Fatal,
        }
    }
}

impl fmt::Display for IoDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::PeerGone => write!(f, "peer gone"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}
