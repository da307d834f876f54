pub mod reader;
pub mod record;
pub mod writer;

pub use reader::WALReader;
pub use record::{OpKind, Operation, WriteBatch};
pub use writer::{LogFile, WALWriter};

use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::index::Index;

/// Controls when a log is fsync'd to disk.
///
/// Trade-off: durability vs throughput.
///   - EveryWrite: nothing acknowledged is lost, one fsync per commit
///   - EveryNWrites: batched durability, lose up to N commits on power loss
///   - Manual: only `flush` syncs; the OS decides otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// fsync after every transaction. Safest, slowest.
    EveryWrite,
    /// fsync every N transactions.
    EveryNWrites(usize),
    /// fsync only on explicit flush.
    Manual,
}

/// Lifecycle of a log. `Loading` lasts for the startup replay only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Loading,
    Open,
    Closed,
}

struct LogInner {
    writer: Option<WALWriter>,
    state: LogState,
    valid: bool,
    size: u64,
}

/// One append-only transaction log, bound to one connection.
///
/// Appends, flush and close all take the exclusive lock. An append writes
/// the encoded transaction and merges it into the shared index inside the
/// same critical section, so the file and the index never disagree about
/// what this log contains.
///
/// A log whose write comes up short or fails is quarantined (`valid` goes
/// false for good): the file may now end in half a record, so its offset
/// bookkeeping can't be trusted and every later append is refused. Only a
/// fresh open and replay establishes the real on-disk state again.
///
/// A failed policy fsync after a complete write also quarantines the log,
/// but the transaction that triggered it still counts as appended: its bytes
/// are in the file and a replay will apply them, so the index has to as well.
pub struct Log {
    id: usize,
    path: Option<PathBuf>,
    index: Arc<Index>,
    inner: RwLock<LogInner>,
}

impl Log {
    /// Open or create the log at `path` and replay it into `index`.
    ///
    /// Any record that fails to decode aborts the open with `ReplayFailure`.
    pub fn open(id: usize, path: &Path, index: Arc<Index>, sync_policy: SyncPolicy) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let log = Log {
            id,
            path: Some(path.to_path_buf()),
            index,
            inner: RwLock::new(LogInner {
                writer: None,
                state: LogState::Loading,
                valid: true,
                size: 0,
            }),
        };

        let reader = WALReader::from_bytes(data);
        let replayed = log.replay(&reader)?;

        let mut inner = log.inner.write();
        inner.writer = Some(WALWriter::new(Box::new(file), reader.len(), sync_policy));
        inner.size = reader.len();
        inner.state = LogState::Open;
        drop(inner);

        info!(log_id = id, path = %path.display(), transactions = replayed, bytes = reader.len(), "log opened");
        Ok(log)
    }

    /// Attach a log to empty storage, skipping replay.
    pub fn with_file(id: usize, file: Box<dyn LogFile>, index: Arc<Index>, sync_policy: SyncPolicy) -> Self {
        Log {
            id,
            path: None,
            index,
            inner: RwLock::new(LogInner {
                writer: Some(WALWriter::new(file, 0, sync_policy)),
                state: LogState::Open,
                valid: true,
                size: 0,
            }),
        }
    }

    /// Merge every transaction in `reader` into the index. Returns the number
    /// of transactions replayed.
    fn replay(&self, reader: &WALReader) -> Result<usize> {
        let mut count = 0;
        let mut records = reader.iter();
        loop {
            let offset = records.position();
            match records.next() {
                None => return Ok(count),
                Some(Ok((_, batch))) => {
                    self.index.merge(&batch);
                    count += 1;
                }
                Some(Err(e)) => {
                    error!(log_id = self.id, offset, error = %e, "log replay failed");
                    return Err(Error::ReplayFailure {
                        log_id: self.id,
                        offset,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    /// Append a transaction; `true` only if every byte reached the log and
    /// the index now reflects it.
    pub fn add(&self, batch: &WriteBatch) -> bool {
        self.try_add(batch).is_ok()
    }

    /// Like `add`, reporting why an append was refused or failed.
    pub fn try_add(&self, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Err(Error::EmptyTransaction);
        }
        let bytes = batch.encode()?;

        let mut inner = self.inner.write();
        if !inner.valid {
            return Err(Error::LogInvalid { log_id: self.id });
        }
        if inner.state != LogState::Open {
            return Err(Error::LogClosed { log_id: self.id });
        }
        let Some(writer) = inner.writer.as_mut() else {
            return Err(Error::LogClosed { log_id: self.id });
        };

        if let Err(e) = writer.append(&bytes) {
            inner.valid = false;
            error!(log_id = self.id, error = %e, bytes = bytes.len(), "append failed, log quarantined");
            return Err(e);
        }
        let synced = writer.sync_if_due();

        self.index.merge(batch);
        inner.size += bytes.len() as u64;
        if let Err(e) = synced {
            inner.valid = false;
            error!(log_id = self.id, error = %e, size = inner.size, "sync after append failed, log quarantined");
        }
        debug!(log_id = self.id, operations = batch.len(), bytes = bytes.len(), size = inner.size, "transaction appended");
        Ok(())
    }

    /// Force everything appended so far onto durable storage. A closed log
    /// has nothing left to flush and reports `LogClosed`.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.writer.as_mut() {
            Some(writer) => writer.sync(),
            None => Err(Error::LogClosed { log_id: self.id }),
        }
    }

    /// Release the file handle. Closing twice is a no-op.
    pub fn close(&self) {
        let mut inner = self.inner.write();
        if let Some(mut writer) = inner.writer.take() {
            if let Err(e) = writer.sync() {
                warn!(log_id = self.id, error = %e, "sync on close failed");
            }
            debug!(log_id = self.id, size = inner.size, "log closed");
        }
        inner.state = LogState::Closed;
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Bytes of fully appended transactions.
    pub fn size(&self) -> u64 {
        self.inner.read().size
    }

    pub fn is_valid(&self) -> bool {
        self.inner.read().valid
    }

    pub fn state(&self) -> LogState {
        self.inner.read().state
    }
}
