use std::io;

use thiserror::Error;

/// Unified error type for the storage engine.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Every connection in the pool is checked out.
    #[error("connection pool exhausted ({size} connections in use)")]
    PoolExhausted { size: usize },

    /// Append attempted on a quarantined log.
    #[error("log {log_id} is invalid and refuses writes")]
    LogInvalid { log_id: usize },

    /// Append or flush attempted after the log was closed.
    #[error("log {log_id} is closed")]
    LogClosed { log_id: usize },

    /// The storage accepted fewer bytes than the encoded transaction.
    #[error("short write: wrote {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    /// Malformed operation record (bad marker, kind or key layout).
    #[error("corrupt operation: {0}")]
    CorruptOperation(String),

    /// Malformed transaction record (bad marker or length mismatch).
    #[error("corrupt transaction: {0}")]
    CorruptTransaction(String),

    /// The source ended in the middle of a record.
    #[error("unexpected end of log: needed {needed} more bytes")]
    UnexpectedEndOfLog { needed: usize },

    /// Startup replay could not decode the log.
    #[error("replay of log {log_id} failed at offset {offset}: {source}")]
    ReplayFailure {
        log_id: usize,
        offset: u64,
        source: Box<Error>,
    },

    /// A transaction must carry at least one operation.
    #[error("transaction has no operations")]
    EmptyTransaction,

    /// A length does not fit the u32 prefix the wire format gives it.
    #[error("{field} is {len} bytes, over the u32 length limit")]
    FieldTooLarge { field: &'static str, len: usize },

    /// Rejected `Options`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
