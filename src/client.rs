//! Directory client.
//!
//! [`Client`] speaks the client side of a session; [`run_driver`] is the
//! interactive loop that reads identities and prints the keys returned.

use crate::channel::{ChannelError, FramedChannel, OverflowPolicy};
use crate::net::{self, NetError};
use crate::protocol::{validate_identity, IdentityError, Request, KEY_FRAME_CAPACITY, SENTINEL};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Client errors
#[derive(Debug)]
pub enum ClientError {
    /// Could not reach the server.
    Net(NetError),
    /// Session I/O failed.
    Channel(ChannelError),
    /// Identity cannot be sent.
    Identity(IdentityError),
    /// The sentinel was passed to [`Client::lookup`].
    ReservedIdentity,
    /// Console I/O failed.
    Io(io::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Net(e) => write!(f, "{}", e),
            ClientError::Channel(e) => write!(f, "Session failed: {}", e),
            ClientError::Identity(e) => write!(f, "Invalid identity: {}", e),
            ClientError::ReservedIdentity => {
                write!(f, "'{}' ends the session and cannot be looked up", SENTINEL)
            }
            ClientError::Io(e) => write!(f, "Console I/O error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Net(e) => Some(e),
            ClientError::Channel(e) => Some(e),
            ClientError::Identity(e) => Some(e),
            ClientError::Io(e) => Some(e),
            ClientError::ReservedIdentity => None,
        }
    }
}

impl From<NetError> for ClientError {
    fn from(e: NetError) -> Self {
        ClientError::Net(e)
    }
}

impl From<ChannelError> for ClientError {
    fn from(e: ChannelError) -> Self {
        ClientError::Channel(e)
    }
}

impl From<IdentityError> for ClientError {
    fn from(e: IdentityError) -> Self {
        ClientError::Identity(e)
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

/// Client side of a lookup session.
pub struct Client<S> {
    channel: FramedChannel<S>,
}

impl Client<TcpStream> {
    /// Connect to a directory server.
    pub async fn connect(
        host: &str,
        port: u16,
        overflow: OverflowPolicy,
    ) -> Result<Self, ClientError> {
        let stream = net::connect(host, port).await?;
        Ok(Self::new(stream, overflow))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, overflow: OverflowPolicy) -> Self {
        Self {
            channel: FramedChannel::new(stream, overflow),
        }
    }

    /// Ask for the public key of `identity`. An unknown identity yields an
    /// empty key.
    pub async fn lookup(&mut self, identity: &str) -> Result<String, ClientError> {
        let request = Request::parse(identity);
        if request == Request::Terminate {
            return Err(ClientError::ReservedIdentity);
        }
        validate_identity(identity)?;

        self.channel.send(request.as_wire()).await?;
        let key = self.channel.receive(KEY_FRAME_CAPACITY).await?;
        debug!(identity, key_len = key.len(), "Received key");

        Ok(String::from_utf8_lossy(&key).into_owned())
    }

    /// End the session. The server sends nothing back.
    pub async fn terminate(mut self) -> Result<(), ClientError> {
        self.channel.send(Request::Terminate.as_wire()).await?;
        if let Err(e) = self.channel.shutdown().await {
            debug!(error = %e, "Shutdown after terminate failed");
        }
        Ok(())
    }
}

/// Counters reported by [`run_driver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverSummary {
    pub lookups: usize,
    pub misses: usize,
    pub rejected: usize,
}

/// Prompt for identities on `input` and print their keys to `output` until
/// the sentinel is entered or input ends.
pub async fn run_driver<S, R, W>(
    mut client: Client<S>,
    input: R,
    mut output: W,
) -> Result<DriverSummary, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut summary = DriverSummary::default();

    loop {
        output.write_all(b"Enter a user name: ").await?;
        output.flush().await?;

        let identity = match lines.next_line().await? {
            Some(line) => line,
            None => {
                debug!("Input ended, terminating session");
                output.write_all(b"\n").await?;
                SENTINEL.to_string()
            }
        };

        match Request::parse(&identity) {
            Request::Terminate => {
                client.terminate().await?;
                break;
            }
            Request::Lookup(_) => {
                if let Err(e) = validate_identity(&identity) {
                    warn!(error = %e, "Identity not sent");
                    output
                        .write_all(format!("Cannot look up that user: {e}\n").as_bytes())
                        .await?;
                    summary.rejected += 1;
                    continue;
                }

                let key = client.lookup(&identity).await?;
                output
                    .write_all(format!("The public key for user {identity} is {key}\n").as_bytes())
                    .await?;
                summary.lookups += 1;
                if key.is_empty() {
                    summary.misses += 1;
                }
            }
        }
    }

    output.flush().await?;
    Ok(summary)
}
