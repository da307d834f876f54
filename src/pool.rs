use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transaction::Transaction;
use crate::wal::Log;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Available,
    InUse,
}

/// Fixed set of connections, one per log.
///
/// Checkout never waits: it hands out the first available connection or
/// fails with `PoolExhausted`. The mutex guards only the state array.
pub(crate) struct ConnectionPool {
    logs: Vec<Arc<Log>>,
    states: Mutex<Vec<ConnectionState>>,
}

impl ConnectionPool {
    pub(crate) fn new(logs: Vec<Arc<Log>>) -> Self {
        let states = vec![ConnectionState::Available; logs.len()];
        ConnectionPool {
            logs,
            states: Mutex::new(states),
        }
    }

    pub(crate) fn checkout(self: &Arc<Self>) -> Result<Connection> {
        let mut states = self.states.lock();
        let Some(id) = states.iter().position(|s| *s == ConnectionState::Available) else {
            warn!(size = states.len(), "connection pool exhausted");
            return Err(Error::PoolExhausted { size: states.len() });
        };
        states[id] = ConnectionState::InUse;
        drop(states);

        debug!(connection = id, "connection checked out");
        Ok(Connection {
            id,
            log: Arc::clone(&self.logs[id]),
            pool: Arc::clone(self),
        })
    }

    fn release(&self, id: usize) {
        self.states.lock()[id] = ConnectionState::Available;
        debug!(connection = id, "connection checked in");
    }

    pub(crate) fn logs(&self) -> &[Arc<Log>] {
        &self.logs
    }

    pub(crate) fn size(&self) -> usize {
        self.logs.len()
    }

    pub(crate) fn available(&self) -> usize {
        self.states
            .lock()
            .iter()
            .filter(|s| **s == ConnectionState::Available)
            .count()
    }

    pub(crate) fn state(&self, id: usize) -> Option<ConnectionState> {
        self.states.lock().get(id).copied()
    }
}

/// Exclusive handle on one log, checked out of a `DB`.
///
/// Goes back to the pool when dropped, or explicitly via `DB::checkin`.
pub struct Connection {
    id: usize,
    log: Arc<Log>,
    pool: Arc<ConnectionPool>,
}

impl Connection {
    /// Connection ordinal; also names its log file.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }

    /// Start a transaction against this connection's log.
    pub fn begin_transaction(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.log))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}
