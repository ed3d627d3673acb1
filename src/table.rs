//! Identity table.
//!
//! An ordered, read-only list of (identity, public key) pairs loaded once at
//! startup. Lookups scan front to back and return the first match, so a
//! duplicated identity always resolves to its earliest entry.

use crate::protocol::{MAX_IDENTITY_LEN, MAX_KEY_LEN};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A single (identity, public key) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub identity: String,
    pub public_key: String,
}

/// Errors that prevent a table from being built.
#[derive(Debug)]
pub enum TableError {
    /// The source holds more well-formed records than the table may store.
    CapacityExceeded {
        path: Option<PathBuf>,
        capacity: usize,
    },
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::CapacityExceeded {
                path: Some(path),
                capacity,
            } => write!(
                f,
                "Table file '{}' holds more than {} entries",
                path.display(),
                capacity
            ),
            TableError::CapacityExceeded {
                path: None,
                capacity,
            } => write!(f, "Table holds more than {} entries", capacity),
        }
    }
}

impl std::error::Error for TableError {}

/// Immutable identity -> public key table.
#[derive(Debug, Clone, Default)]
pub struct IdentityTable {
    entries: Vec<TableEntry>,
}

impl IdentityTable {
    /// Load a table from a file of whitespace-separated `<identity> <key>`
    /// pairs.
    ///
    /// A file that cannot be read yields an empty table. Loading stops
    /// silently at the first malformed record.
    pub fn load(path: &Path, capacity: usize) -> Result<Self, TableError> {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not open table file, serving an empty table"
                );
                return Ok(Self::default());
            }
        };

        let table = Self::parse(&contents, capacity).map_err(|e| match e {
            TableError::CapacityExceeded { capacity, .. } => TableError::CapacityExceeded {
                path: Some(path.to_path_buf()),
                capacity,
            },
        })?;

        info!(path = %path.display(), entries = table.len(), "Loaded identity table");
        Ok(table)
    }

    /// Parse table contents held in memory.
    pub fn parse(contents: &[u8], capacity: usize) -> Result<Self, TableError> {
        let mut tokens = contents
            .split(|b| b.is_ascii_whitespace())
            .filter(|token| !token.is_empty());
        let mut entries: Vec<TableEntry> = Vec::new();

        while let Some(identity) = tokens.next() {
            let Some(public_key) = tokens.next() else {
                debug!(record = entries.len(), "Identity without a key, stopping");
                break;
            };
            let Some(entry) = parse_record(identity, public_key) else {
                warn!(record = entries.len(), "Malformed table record, stopping");
                break;
            };
            if entries.len() == capacity {
                return Err(TableError::CapacityExceeded {
                    path: None,
                    capacity,
                });
            }
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    /// Build a table from entries, keeping their order.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = TableEntry>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Public key of the first entry whose identity bytes equal `identity`,
    /// or `""` when absent.
    pub fn lookup<I: AsRef<[u8]>>(&self, identity: I) -> &str {
        let identity = identity.as_ref();
        self.entries
            .iter()
            .find(|entry| entry.identity.as_bytes() == identity)
            .map(|entry| entry.public_key.as_str())
            .unwrap_or("")
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in load order.
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }
}

fn parse_record(identity: &[u8], public_key: &[u8]) -> Option<TableEntry> {
    if identity.len() > MAX_IDENTITY_LEN || public_key.len() > MAX_KEY_LEN {
        return None;
    }
    let identity = std::str::from_utf8(identity).ok()?;
    let public_key = std::str::from_utf8(public_key).ok()?;
    Some(TableEntry {
        identity: identity.to_string(),
        public_key: public_key.to_string(),
    })
}
