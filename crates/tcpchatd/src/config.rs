//! Server configuration.
//!
//! The port comes from the command line; the bind address defaults to
//! all IPv4 interfaces and can be overridden with `TCPCHAT_BIND`.

use std::env;
use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;

/// Environment variable overriding the bind address.
pub const BIND_ENV_VAR: &str = "TCPCHAT_BIND";

/// Listen backlog for the server socket.
pub const LISTEN_BACKLOG: u32 = 32;

/// Lowest port the server accepts on the command line.
pub const MIN_PORT: u16 = 1024;

/// Highest port the server accepts on the command line.
pub const MAX_PORT: u16 = u16::MAX;

/// Errors produced while building the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid port number: '{0}'")]
    InvalidPort(String),

    #[error("port {0} out of range (1024-65535)")]
    PortOutOfRange(u64),

    #[error("invalid TCPCHAT_BIND value '{0}': expected an IPv4 address")]
    InvalidBindAddress(String),
}

/// Where and how the listener binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Local address to bind
    pub bind_addr: SocketAddrV4,

    /// Pending-connection backlog passed to `listen`
    pub backlog: u32,
}

impl ServerConfig {
    /// Configuration listening on `0.0.0.0:<port>`.
    pub fn new(port: u16) -> Self {
        Self {
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port),
            backlog: LISTEN_BACKLOG,
        }
    }

    /// Replaces the bind IP, keeping the port.
    #[must_use]
    pub fn with_bind_ip(mut self, ip: Ipv4Addr) -> Self {
        self.bind_addr.set_ip(ip);
        self
    }

    /// Builds the configuration for `port`, honouring `TCPCHAT_BIND`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBindAddress` if the variable is set
    /// to something other than an IPv4 address.
    pub fn from_env(port: u16) -> Result<Self, ConfigError> {
        Self::with_bind_override(port, env::var(BIND_ENV_VAR).ok())
    }

    fn with_bind_override(port: u16, bind: Option<String>) -> Result<Self, ConfigError> {
        let config = Self::new(port);

        match bind {
            None => Ok(config),
            Some(value) => {
                let ip = value
                    .trim()
                    .parse::<Ipv4Addr>()
                    .map_err(|_| ConfigError::InvalidBindAddress(value.clone()))?;
                Ok(config.with_bind_ip(ip))
            }
        }
    }
}

/// Parses a command-line port, accepting only 1024-65535.
///
/// # Errors
///
/// - `ConfigError::InvalidPort` if `s` is not a number
/// - `ConfigError::PortOutOfRange` if it falls outside 1024-65535
pub fn parse_port(s: &str) -> Result<u16, ConfigError> {
    let port: u64 = s
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort(s.to_string()))?;

    match u16::try_from(port) {
        Ok(p) if p >= MIN_PORT => Ok(p),
        _ => Err(ConfigError::PortOutOfRange(port)),
    }
}
