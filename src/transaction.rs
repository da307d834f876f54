use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::types::{Key, Value};
use crate::wal::{Log, Operation, WriteBatch};

/// An ordered set of operations bound for one log.
///
/// Nothing is visible or durable until `commit`, which appends the whole
/// transaction or nothing. Committing consumes the transaction.
pub struct Transaction {
    log: Arc<Log>,
    batch: WriteBatch,
}

impl Transaction {
    pub fn new(log: Arc<Log>) -> Self {
        Transaction {
            log,
            batch: WriteBatch::new(),
        }
    }

    pub fn set(&mut self, key: Key, value: impl Into<Value>) -> &mut Self {
        self.batch.push(Operation::set(key, value.into()));
        self
    }

    /// Combine `delta` with the cell's current value under the index's
    /// add rule.
    pub fn add(&mut self, key: Key, delta: impl Into<Value>) -> &mut Self {
        self.batch.push(Operation::add(key, delta.into()));
        self
    }

    pub fn delete(&mut self, key: Key) -> &mut Self {
        self.batch.push(Operation::delete(key));
        self
    }

    pub fn operations(&self) -> &[Operation] {
        self.batch.operations()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }

    /// Append to the log. `false` means none of the operations took effect
    /// and they must be redone, possibly on another connection.
    pub fn commit(self) -> bool {
        match self.try_commit() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "commit failed");
                false
            }
        }
    }

    /// Like `commit`, reporting why the transaction was not appended.
    pub fn try_commit(self) -> Result<()> {
        self.log.try_add(&self.batch)
    }
}
