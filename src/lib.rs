#![forbid(unsafe_code)]

//! Replication and leadership core for a distributed SQLite-compatible
//! filesystem.
//!
//! Every node hosts local copies of one or more databases. Exactly one node
//! holds the primary lease at a time and serves writes; the others stream
//! checksum-chained LTX transaction files from it and converge to the same
//! per-database position. Leadership itself is delegated to an external
//! lease service behind the [`Leaser`] trait.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod lease;
pub mod lock;
pub mod ltx;
pub mod metrics;
pub mod pos;
pub mod store;
pub mod stream;
pub mod subscriber;

pub use config::StoreOptions;
pub use context::{CancelHandle, Context, PrimaryCtx};
pub use db::{DB, HaltLock};
pub use error::{Error, Result};
pub use lease::{Lease, Leaser, PrimaryInfo, StaticLeaser};
pub use lock::{GuardSet, LockState};
pub use pos::{Pos, PosMap, Txid, format_node_id, parse_node_id};
pub use store::{Store, StoreStatus};
pub use stream::{ChunkReader, ChunkWriter, Client, StreamFrame};
pub use subscriber::Subscriber;
