use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;
use xxhash_rust::xxh3::Xxh3Builder;

use crate::error::{Error, Result};
use crate::index::add::{AddRule, CounterAdd};
use crate::index::{Index, Version};
use crate::pool::{Connection, ConnectionPool, ConnectionState};
use crate::types::{CellKey, Timestamp, Value};
use crate::wal::{Log, SyncPolicy};

/// Database configuration.
#[derive(Clone)]
pub struct Options {
    /// Number of connections, and therefore log files.
    pub pool_size: usize,
    pub sync_policy: SyncPolicy,
    /// Combination rule applied by `Add` operations.
    pub add_rule: Arc<dyn AddRule>,
}

impl Options {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_sync_policy(mut self, sync_policy: SyncPolicy) -> Self {
        self.sync_policy = sync_policy;
        self
    }

    pub fn with_add_rule(mut self, add_rule: Arc<dyn AddRule>) -> Self {
        self.add_rule = add_rule;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            pool_size: 4,
            sync_policy: SyncPolicy::Manual,
            add_rule: Arc::new(CounterAdd),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("pool_size", &self.pool_size)
            .field("sync_policy", &self.sync_policy)
            .finish_non_exhaustive()
    }
}

/// Point-in-time counters for a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub connections: usize,
    pub available: usize,
    /// Logs quarantined after a failed append.
    pub invalid_logs: usize,
    /// Bytes of fully appended transactions across all logs.
    pub bytes_logged: u64,
    /// Distinct cells in the index.
    pub cells: usize,
}

/// An open database: a directory of logs, one per pooled connection, all
/// reconciled into one index.
///
/// On disk:
/// ```text
/// <dir>/0.log
/// <dir>/1.log
/// ...
/// ```
pub struct DB {
    dir: PathBuf,
    index: Arc<Index>,
    pool: Arc<ConnectionPool>,
    locks: DashMap<String, Arc<Mutex<()>>, Xxh3Builder>,
}

impl DB {
    /// Open (or create) the database in `dir`, replaying every log.
    ///
    /// If any log fails to replay the whole open fails.
    pub fn open(dir: impl AsRef<Path>, options: Options) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if options.pool_size == 0 {
            return Err(Error::InvalidConfig("pool_size must be at least 1".into()));
        }
        fs::create_dir_all(&dir)?;

        let index = Arc::new(Index::with_add_rule(Arc::clone(&options.add_rule)));
        let logs = (0..options.pool_size)
            .map(|id| {
                let path = dir.join(format!("{id}.log"));
                Log::open(id, &path, Arc::clone(&index), options.sync_policy).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(path = %dir.display(), connections = logs.len(), cells = index.len(), "database opened");
        Ok(DB {
            dir,
            index,
            pool: Arc::new(ConnectionPool::new(logs)),
            locks: DashMap::with_hasher(Xxh3Builder::new()),
        })
    }

    /// Take an available connection, or fail with `PoolExhausted`.
    pub fn checkout(&self) -> Result<Connection> {
        self.pool.checkout()
    }

    /// Return a connection to the pool. Dropping it does the same.
    pub fn checkin(&self, connection: Connection) {
        drop(connection);
    }

    /// State of connection `id`, if it exists.
    pub fn connection_state(&self, id: usize) -> Option<ConnectionState> {
        self.pool.state(id)
    }

    /// The mutex registered under `name`, created on first use. Every caller
    /// asking for the same name gets the same mutex.
    pub fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(name) {
            return Arc::clone(lock.value());
        }
        let entry = self.locks.entry(name.to_owned()).or_default();
        Arc::clone(entry.value())
    }

    /// Newest visible value of a cell at or before `at`.
    pub fn get(
        &self,
        table: &str,
        row: &str,
        column: &str,
        qualifier: Option<&str>,
        at: Timestamp,
    ) -> Option<Value> {
        self.index.query(&CellKey::new(table, row, column, qualifier), at)
    }

    /// Every version of a cell, oldest first.
    pub fn history(&self, cell: &CellKey) -> Vec<(Timestamp, Version)> {
        self.index.history(cell)
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// All logs, in connection order.
    pub fn logs(&self) -> &[Arc<Log>] {
        self.pool.logs()
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Sync every log to disk.
    pub fn flush(&self) -> Result<()> {
        for log in self.pool.logs() {
            log.flush()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        let logs = self.pool.logs();
        Stats {
            connections: self.pool.size(),
            available: self.pool.available(),
            invalid_logs: logs.iter().filter(|l| !l.is_valid()).count(),
            bytes_logged: logs.iter().map(|l| l.size()).sum(),
            cells: self.index.len(),
        }
    }

    /// Close every log. Safe to call more than once.
    pub fn close(&self) {
        for log in self.pool.logs() {
            log.close();
        }
        info!(path = %self.dir.display(), "database closed");
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        self.close();
    }
}
