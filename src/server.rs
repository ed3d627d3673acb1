//! TCP server answering identity lookups.
//!
//! Accepts connections and runs one session per connection against the
//! shared, read-only identity table.

use crate::channel::{ChannelError, FramedChannel, OverflowPolicy};
use crate::config::Config;
use crate::net::{self, NetError};
use crate::protocol::{Request, IDENTITY_FRAME_CAPACITY};
use crate::table::IdentityTable;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{AcquireError, Semaphore};
use tracing::{debug, info, trace};

/// How a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent the sentinel.
    Terminated,
    /// Client closed the connection between requests.
    Disconnected,
}

/// Serve lookups on one connection until the client terminates or leaves.
///
/// Receives an identity, answers with its key (empty when unknown) and
/// repeats. The sentinel ends the session without a response.
pub async fn serve_session<S>(
    stream: S,
    table: &IdentityTable,
    overflow: OverflowPolicy,
) -> Result<SessionEnd, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut channel = FramedChannel::new(stream, overflow);
    let mut lookups = 0usize;

    loop {
        let message = match channel.receive(IDENTITY_FRAME_CAPACITY).await {
            Ok(message) => message,
            Err(ChannelError::Closed) => {
                debug!(lookups, "Client closed connection without terminating");
                return Ok(SessionEnd::Disconnected);
            }
            Err(e) => return Err(e),
        };

        match Request::decode(&message) {
            Request::Terminate => {
                debug!(lookups, "Client terminated session");
                if let Err(e) = channel.shutdown().await {
                    debug!(error = %e, "Shutdown after terminate failed");
                }
                return Ok(SessionEnd::Terminated);
            }
            Request::Lookup(identity) => {
                let key = table.lookup(&identity);
                trace!(
                    identity = %String::from_utf8_lossy(&identity),
                    found = !key.is_empty(),
                    "Lookup"
                );
                channel.send(key.as_bytes()).await?;
                lookups += 1;
            }
        }
    }
}

/// Server errors that stop the accept loop.
#[derive(Debug)]
pub enum ServerError {
    Net(NetError),
    Closed(AcquireError),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Net(e) => write!(f, "{}", e),
            ServerError::Closed(e) => write!(f, "Connection limiter closed: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Net(e) => Some(e),
            ServerError::Closed(e) => Some(e),
        }
    }
}

impl From<NetError> for ServerError {
    fn from(e: NetError) -> Self {
        ServerError::Net(e)
    }
}

impl From<AcquireError> for ServerError {
    fn from(e: AcquireError) -> Self {
        ServerError::Closed(e)
    }
}

/// Server instance
pub struct Server {
    config: Config,
    table: Arc<IdentityTable>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, table: Arc<IdentityTable>) -> Self {
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));
        Server {
            config,
            table,
            connection_limit,
        }
    }

    /// Bind the configured address and serve until a fatal error.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener =
            net::listen(&self.config.host, self.config.port, self.config.backlog).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener`, one task per session.
    ///
    /// Once `max_connections` sessions are active, further clients wait in
    /// the listen backlog until a session ends.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!(
            entries = self.table.len(),
            max_connections = self.config.max_connections,
            "Serving identity lookups"
        );

        loop {
            // Wait for a session slot before accepting
            let permit = self.connection_limit.clone().acquire_owned().await?;
            let (stream, peer) = net::accept(&listener).await?;
            info!(peer = %peer, "Accepted connection");

            let table = Arc::clone(&self.table);
            let overflow = self.config.overflow;

            tokio::spawn(async move {
                match serve_session(stream, &table, overflow).await {
                    Ok(end) => info!(peer = %peer, ?end, "Session ended"),
                    Err(e) => debug!(peer = %peer, error = %e, "Session failed"),
                }
                drop(permit);
            });
        }
    }
}
