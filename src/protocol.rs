//! Directory lookup wire protocol.
//!
//! Every message is the raw bytes of a string followed by a single `0x00`
//! terminator byte:
//!
//! ```text
//! Client -> Server:  <identity bytes (<= 100)> 0x00
//! Server -> Client:  <public key bytes (<= 512, may be empty)> 0x00
//! ```
//!
//! The client ends a session by sending the sentinel identity `Terminate.`,
//! to which the server sends no response.

/// Byte marking the end of every message.
pub const TERMINATOR: u8 = 0x00;

/// Identity value reserved to end a session.
pub const SENTINEL: &str = "Terminate.";

/// Maximum identity length in bytes (terminator excluded).
pub const MAX_IDENTITY_LEN: usize = 100;

/// Maximum public key length in bytes (terminator excluded).
pub const MAX_KEY_LEN: usize = 512;

/// Receive capacity for client -> server messages.
pub const IDENTITY_FRAME_CAPACITY: usize = MAX_IDENTITY_LEN + 1;

/// Receive capacity for server -> client messages.
pub const KEY_FRAME_CAPACITY: usize = MAX_KEY_LEN + 1;

/// A client -> server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Look up the public key registered for an identity, kept as the raw
    /// bytes received so matching stays byte-exact.
    Lookup(Vec<u8>),
    /// End the session. No response follows.
    Terminate,
}

impl Request {
    /// Decode a received identity message (terminator already stripped).
    pub fn decode(bytes: &[u8]) -> Request {
        if bytes == SENTINEL.as_bytes() {
            return Request::Terminate;
        }
        Request::Lookup(bytes.to_vec())
    }

    /// Build a request from an identity typed by a user.
    pub fn parse(identity: &str) -> Request {
        if identity == SENTINEL {
            Request::Terminate
        } else {
            Request::Lookup(identity.as_bytes().to_vec())
        }
    }

    /// Bytes sent on the wire for this request, terminator excluded.
    pub fn as_wire(&self) -> &[u8] {
        match self {
            Request::Lookup(identity) => identity,
            Request::Terminate => SENTINEL.as_bytes(),
        }
    }
}

/// Reasons an identity cannot be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Identity exceeds [`MAX_IDENTITY_LEN`] bytes.
    TooLong(usize),
    /// Identity contains the terminator byte.
    ContainsTerminator,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::TooLong(len) => write!(
                f,
                "identity is {len} bytes long, the maximum is {MAX_IDENTITY_LEN}"
            ),
            IdentityError::ContainsTerminator => write!(f, "identity contains a NUL byte"),
        }
    }
}

impl std::error::Error for IdentityError {}

/// Check that an identity fits in a single request frame.
pub fn validate_identity(identity: &str) -> Result<(), IdentityError> {
    if identity.len() > MAX_IDENTITY_LEN {
        return Err(IdentityError::TooLong(identity.len()));
    }
    if identity.as_bytes().contains(&TERMINATOR) {
        return Err(IdentityError::ContainsTerminator);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sentinel() {
        assert_eq!(Request::decode(b"Terminate."), Request::Terminate);
    }

    #[test]
    fn test_decode_sentinel_is_exact() {
        assert_eq!(
            Request::decode(b"Terminate"),
            Request::Lookup(b"Terminate".to_vec())
        );
        assert_eq!(
            Request::decode(b"terminate."),
            Request::Lookup(b"terminate.".to_vec())
        );
        assert_eq!(
            Request::decode(b"Terminate. "),
            Request::Lookup(b"Terminate. ".to_vec())
        );
    }

    #[test]
    fn test_decode_lookup() {
        assert_eq!(Request::decode(b"alice"), Request::Lookup(b"alice".to_vec()));
        assert_eq!(Request::decode(b""), Request::Lookup(Vec::new()));
    }

    #[test]
    fn test_decode_keeps_raw_bytes() {
        match Request::decode(&[0x61, 0xff, 0x62]) {
            Request::Lookup(identity) => assert_eq!(identity, vec![0x61, 0xff, 0x62]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_and_wire() {
        let request = Request::parse("bob");
        assert_eq!(request.as_wire(), b"bob");

        let request = Request::parse(SENTINEL);
        assert_eq!(request, Request::Terminate);
        assert_eq!(request.as_wire(), b"Terminate.");
    }

    #[test]
    fn test_validate_identity() {
        assert!(validate_identity("alice").is_ok());
        assert!(validate_identity(&"x".repeat(MAX_IDENTITY_LEN)).is_ok());
        assert_eq!(
            validate_identity(&"x".repeat(MAX_IDENTITY_LEN + 1)),
            Err(IdentityError::TooLong(MAX_IDENTITY_LEN + 1))
        );
        assert_eq!(
            validate_identity("a\0b"),
            Err(IdentityError::ContainsTerminator)
        );
    }
}
