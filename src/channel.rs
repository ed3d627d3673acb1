//! Framed byte channel.
//!
//! Carries terminator-delimited messages over a byte stream that may
//! accept or deliver data in arbitrary-sized pieces. Sends loop until the
//! whole frame is written; receives accumulate until a terminator shows up
//! anywhere in the accumulated bytes or the receive capacity is used up.

use crate::protocol::TERMINATOR;
use bytes::{Buf, BufMut, BytesMut};
use serde::Deserialize;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

/// What to do when the receive capacity fills up without a terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Fail the receive with [`ChannelError::Overflow`].
    #[default]
    Reject,
    /// Legacy behaviour: treat the last byte of the full window as the
    /// terminator and return the rest as the message.
    Truncate,
}

/// Errors produced by the framed channel.
#[derive(Debug)]
pub enum ChannelError {
    /// Underlying read or write failed.
    Io(io::Error),
    /// Peer closed the stream between messages.
    Closed,
    /// Peer closed the stream in the middle of a message.
    UnexpectedEof { buffered: usize },
    /// Receive capacity filled without a terminator.
    Overflow { capacity: usize },
    /// Outgoing message contains the terminator byte.
    EmbeddedTerminator,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Io(e) => write!(f, "I/O error: {}", e),
            ChannelError::Closed => write!(f, "Connection closed by peer"),
            ChannelError::UnexpectedEof { buffered } => write!(
                f,
                "Connection closed with {} bytes of an unterminated message",
                buffered
            ),
            ChannelError::Overflow { capacity } => write!(
                f,
                "Message exceeds {} bytes without a terminator",
                capacity
            ),
            ChannelError::EmbeddedTerminator => {
                write!(f, "Message contains an embedded terminator byte")
            }
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        ChannelError::Io(e)
    }
}

/// A byte stream carrying terminator-delimited messages.
///
/// Bytes received past a terminator are kept for the next [`receive`].
///
/// [`receive`]: FramedChannel::receive
pub struct FramedChannel<S> {
    stream: S,
    buffer: BytesMut,
    overflow: OverflowPolicy,
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(stream: S, overflow: OverflowPolicy) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            overflow,
        }
    }

    /// Send one message followed by the terminator.
    ///
    /// Partial writes are retried with the remaining bytes until the whole
    /// frame has been accepted.
    pub async fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        if message.contains(&TERMINATOR) {
            return Err(ChannelError::EmbeddedTerminator);
        }

        let mut frame = BytesMut::with_capacity(message.len() + 1);
        frame.put_slice(message);
        frame.put_u8(TERMINATOR);

        let total = frame.len();
        let mut written = 0;
        while written < total {
            match self.stream.write(&frame[written..]).await {
                Ok(0) => {
                    return Err(ChannelError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "stream accepted no bytes",
                    )))
                }
                Ok(n) => {
                    written += n;
                    trace!(written, total, "Wrote frame bytes");
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }

        self.stream.flush().await?;
        Ok(())
    }

    /// Receive one message, reading at most `capacity` bytes for it
    /// (terminator included).
    ///
    /// Returns the message with the terminator stripped.
    pub async fn receive(&mut self, capacity: usize) -> Result<Vec<u8>, ChannelError> {
        loop {
            // Scan everything accumulated so far; the terminator may have
            // arrived in an earlier partial read.
            let window = self.buffer.len().min(capacity);
            if let Some(pos) = self.buffer[..window].iter().position(|&b| b == TERMINATOR) {
                let message = self.buffer.split_to(pos).to_vec();
                self.buffer.advance(1);
                return Ok(message);
            }

            if self.buffer.len() >= capacity {
                return self.overflowed(capacity);
            }

            let remaining = capacity - self.buffer.len();
            let n = {
                let mut limited = (&mut self.buffer).limit(remaining);
                match self.stream.read_buf(&mut limited).await {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(ChannelError::Io(e)),
                }
            };

            if n == 0 {
                if self.buffer.is_empty() {
                    return Err(ChannelError::Closed);
                }
                return Err(ChannelError::UnexpectedEof {
                    buffered: self.buffer.len(),
                });
            }
            trace!(n, buffered = self.buffer.len(), capacity, "Read frame bytes");
        }
    }

    fn overflowed(&mut self, capacity: usize) -> Result<Vec<u8>, ChannelError> {
        match self.overflow {
            OverflowPolicy::Reject => Err(ChannelError::Overflow { capacity }),
            OverflowPolicy::Truncate => {
                warn!(capacity, "Message filled the receive buffer, truncating");
                let mut window = self.buffer.split_to(capacity);
                window.truncate(capacity.saturating_sub(1));
                Ok(window.to_vec())
            }
        }
    }

    /// Close the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Consume the channel, returning the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}
