//! Listening socket setup and accept handling.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, info};

use super::ServerError;
use crate::config::ServerConfig;

/// Binds the listening socket described by `config`.
///
/// The socket is IPv4, has `SO_REUSEPORT` set where the platform
/// supports it, and listens with the configured backlog.
///
/// # Errors
///
/// Returns `ServerError::Bind` if the socket cannot be created, configured,
/// bound or put into listening state.
pub fn bind_listener(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr = config.bind_addr;
    let bind_err = |source: io::Error| ServerError::Bind { addr, source };

    let socket = TcpSocket::new_v4().map_err(bind_err)?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true).map_err(bind_err)?;

    socket.bind(SocketAddr::V4(addr)).map_err(bind_err)?;
    let listener = socket.listen(config.backlog).map_err(bind_err)?;

    info!(
        addr = %addr,
        backlog = config.backlog,
        "Listening for chat clients"
    );

    Ok(listener)
}

/// Sorts the result of one `accept` call.
///
/// `Ok(None)` means the call was interrupted and the loop should simply
/// wait again; every other failure is fatal.
pub(crate) fn accepted<T>(result: io::Result<T>) -> Result<Option<T>, ServerError> {
    match result {
        Ok(conn) => Ok(Some(conn)),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
            debug!("Accept interrupted, retrying");
            Ok(None)
        }
        Err(e) => Err(ServerError::Accept(e)),
    }
}
