//! Transactional positions and node identifiers.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Transaction identifier. Formats as zero-padded 16-digit lowercase hex.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Txid(pub u64);

impl Txid {
    pub const ZERO: Txid = Txid(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({:016x})", self.0)
    }
}

impl FromStr for Txid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(Error::InvalidTxid {
                value: s.to_string(),
            });
        }
        u64::from_str_radix(s, 16)
            .map(Txid)
            .map_err(|_| Error::InvalidTxid {
                value: s.to_string(),
            })
    }
}

/// The exact transactional state of a database: the last applied transaction
/// and the checksum of the database contents after it was applied.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub txid: Txid,
    pub post_apply_checksum: u64,
}

impl Pos {
    pub fn new(txid: Txid, post_apply_checksum: u64) -> Self {
        Self {
            txid,
            post_apply_checksum,
        }
    }

    /// The zero value marks an empty database.
    pub fn is_zero(&self) -> bool {
        *self == Pos::default()
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:016x}", self.txid, self.post_apply_checksum)
    }
}

impl fmt::Debug for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({self})")
    }
}

/// Snapshot of database positions, keyed by database name.
pub type PosMap = HashMap<String, Pos>;

/// Formats a node ID the way it is persisted in the data directory:
/// 16 uppercase hex digits.
pub fn format_node_id(id: u64) -> String {
    format!("{id:016X}")
}

/// Parses a persisted node ID. Accepts at most 16 hex digits.
pub fn parse_node_id(s: &str) -> Result<u64, Error> {
    let s = s.trim();
    if s.is_empty() || s.len() > 16 {
        return Err(Error::InvalidNodeId {
            value: s.to_string(),
        });
    }
    u64::from_str_radix(s, 16).map_err(|_| Error::InvalidNodeId {
        value: s.to_string(),
    })
}
