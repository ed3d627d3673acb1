//! keydir: a public-key directory service
//!
//! A server loads a table of (identity, public key) pairs and answers
//! identity lookups from clients over TCP. Messages are null-terminated
//! strings; a client ends its session by sending `Terminate.`.
//!
//! Modules:
//! - `protocol`: wire constants and request decoding
//! - `channel`: terminator-delimited framing over a byte stream
//! - `net`: listening, accepting and connecting sockets
//! - `table`: the identity table
//! - `server`: per-connection sessions and the accept loop
//! - `client`: client session and interactive driver
//! - `config`: CLI and TOML configuration
//! - `console`: startup prompts for values not given on the command line

pub mod channel;
pub mod client;
pub mod config;
pub mod console;
pub mod net;
pub mod protocol;
pub mod server;
pub mod table;
