//! Connection establishment.
//!
//! Passive sockets for the server (resolve, bind, listen, accept) and
//! active sockets for the client (resolve, connect).

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, info};

/// Default pending-connection backlog.
pub const DEFAULT_BACKLOG: i32 = 10;

/// Socket setup and connection errors.
#[derive(Debug)]
pub enum NetError {
    /// Host name could not be resolved.
    Resolve { host: String, source: io::Error },
    /// Host name resolved to no addresses.
    NoAddress { host: String },
    /// Socket could not be created or configured.
    Socket(io::Error),
    /// Socket could not be bound.
    Bind { addr: SocketAddr, source: io::Error },
    /// Socket could not be marked passive.
    Listen { addr: SocketAddr, source: io::Error },
    /// `accept` failed for a reason other than interruption.
    Accept(io::Error),
    /// No resolved address accepted the connection.
    Connect { host: String, port: u16, source: io::Error },
}

impl std::fmt::Display for NetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetError::Resolve { host, source } => {
                write!(f, "Failed to resolve host '{}': {}", host, source)
            }
            NetError::NoAddress { host } => write!(f, "Host '{}' has no addresses", host),
            NetError::Socket(e) => write!(f, "Failed to create socket: {}", e),
            NetError::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            NetError::Listen { addr, source } => {
                write!(f, "Failed to listen on {}: {}", addr, source)
            }
            NetError::Accept(e) => write!(f, "Failed to accept connection: {}", e),
            NetError::Connect { host, port, source } => {
                write!(f, "Failed to connect to {}:{}: {}", host, port, source)
            }
        }
    }
}

impl std::error::Error for NetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetError::Resolve { source, .. }
            | NetError::Bind { source, .. }
            | NetError::Listen { source, .. }
            | NetError::Connect { source, .. } => Some(source),
            NetError::Socket(e) | NetError::Accept(e) => Some(e),
            NetError::NoAddress { .. } => None,
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, NetError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|source| NetError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(NetError::NoAddress {
            host: host.to_string(),
        });
    }
    debug!(host, ?addrs, "Resolved host");
    Ok(addrs)
}

/// Bind a listening socket on the first address `host` resolves to.
pub async fn listen(host: &str, port: u16, backlog: i32) -> Result<TcpListener, NetError> {
    let addr = resolve(host, port).await?[0];

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(NetError::Socket)?;
    socket.set_reuse_address(true).map_err(NetError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|source| NetError::Bind { addr, source })?;
    socket
        .listen(backlog)
        .map_err(|source| NetError::Listen { addr, source })?;
    socket.set_nonblocking(true).map_err(NetError::Socket)?;

    let listener = TcpListener::from_std(socket.into()).map_err(NetError::Socket)?;
    info!(addr = %addr, backlog, "Listening");
    Ok(listener)
}

/// Wait for the next connection, retrying interrupted accepts.
pub async fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), NetError> {
    loop {
        match listener.accept().await {
            Ok(accepted) => return Ok(accepted),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                debug!("Accept interrupted, retrying");
                continue;
            }
            Err(e) => return Err(NetError::Accept(e)),
        }
    }
}

/// Connect to `host:port`, trying each resolved address in turn.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream, NetError> {
    let mut last_error = None;

    for addr in resolve(host, port).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!(addr = %addr, "Connected");
                return Ok(stream);
            }
            Err(e) => {
                debug!(addr = %addr, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(NetError::Connect {
        host: host.to_string(),
        port,
        source: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses")),
    })
}
