//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Raw input is longer than the relay accepts for a single line
    #[error("message too long: {len} bytes (max: {max})")]
    MessageTooLong { len: usize, max: usize },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
