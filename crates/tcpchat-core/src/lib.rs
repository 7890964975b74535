//! tcpchat Core - Shared types for the chat relay
//!
//! This crate provides the domain types used by the relay daemon
//! (tcpchatd): the line sanitizer, client identity, message origin and
//! the classification of I/O failures into retry / evict / fatal.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod client;
pub mod error;
pub mod io;
pub mod message;
pub mod sanitize;

// Re-exports for convenience
pub use client::{ClientId, ClientInfo};
pub use error::{DomainError, DomainResult};
pub use io::IoDisposition;
pub use message::{Message, Origin};
pub use sanitize::{sanitize, Line, MAX_MESSAGE_LEN, READ_CHUNK_LEN};
