//! # celldb
//!
//! An embedded, append-only cell store.
//!
//! ## Core idea
//! Every connection owns its own write-ahead log. A commit appends one
//! encoded transaction to that log and, only once every byte is on the
//! file, merges its operations into a single in-memory index shared by all
//! logs. On startup each log is replayed from offset 0 into the same index.
//!
//! Keys are `(table, row, column, qualifier, timestamp)` tuples, so a cell
//! keeps its full version history; deletes are tombstones and `Add`
//! combines a delta with the latest visible value.

pub mod db;
pub mod error;
pub mod index;
pub mod logging;
pub mod pool;
pub mod transaction;
pub mod types;
pub mod wal;

// Public re-exports for the top-level API
pub use db::{DB, Options, Stats};
pub use error::{Error, Result};
pub use index::add::{AddRule, CounterAdd, counter};
pub use index::{Index, Version};
pub use pool::{Connection, ConnectionState};
pub use transaction::Transaction;
pub use types::{CellKey, Key, Timestamp, Value};
pub use wal::{Log, LogState, SyncPolicy};
