//! Crate-level error type.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::ltx::LtxError;
use crate::pos::Pos;
use crate::stream::StreamError;

/// Errors returned from the public surface of the store.
///
/// The first group of variants are sentinels matched by callers; the rest
/// carry structured detail from the apply, lock, and wire layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("store closed")]
    StoreClosed,
    #[error("no primary")]
    NoPrimary,
    #[error("primary exists")]
    PrimaryExists,
    #[error("lease expired")]
    LeaseExpired,
    #[error("database already exists")]
    DatabaseExists,
    #[error("database not found")]
    DatabaseNotFound,

    #[error("leaser required")]
    LeaserRequired,
    #[error("client required")]
    ClientRequired,

    #[error("position mismatch on db {db:?}: {pos} <> {expected}")]
    PosMismatch { db: String, pos: Pos, expected: Pos },
    #[error("database checksum mismatch on db {db:?}: {got:016x} <> {want:016x}")]
    ChecksumMismatch { db: String, got: u64, want: u64 },
    #[error("cannot acquire {name} lock within {timeout:?}")]
    LockTimeout {
        name: &'static str,
        timeout: Duration,
    },
    #[error("invalid node id: {value:?}")]
    InvalidNodeId { value: String },
    #[error("invalid txid: {value:?}")]
    InvalidTxid { value: String },
    #[error("db {name:?}: {source}")]
    Db {
        name: String,
        #[source]
        source: Box<Error>,
    },
    #[error("lease error: {0}")]
    Lease(String),

    #[error(transparent)]
    Ltx(#[from] LtxError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wraps an error with the name of the database it occurred on.
    pub fn with_db(self, name: impl Into<String>) -> Error {
        Error::Db {
            name: name.into(),
            source: Box::new(self),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
