use std::fs::File;
use std::io::{self, Write};

use crate::error::{Error, Result};
use crate::wal::SyncPolicy;

/// Storage a log appends to.
///
/// `write` may accept fewer bytes than offered; a return of `Ok(0)` means the
/// storage will take no more and the append is short.
pub trait LogFile: Write + Send + Sync {
    /// Push everything already written down to durable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Appends encoded transactions to a log file.
///
/// There is no userspace buffer: each transaction goes to the OS in one
/// `write_all`-style loop so a short write is seen by the append that caused
/// it. Durability still depends on the sync policy:
///   write()       → OS page cache
///   sync_all()    → OS page cache → physical disk
pub struct WALWriter {
    file: Box<dyn LogFile>,
    offset: u64,
    sync_policy: SyncPolicy,
    writes_since_sync: usize,
}

impl WALWriter {
    /// Wrap storage whose current length is `offset`.
    pub fn new(file: Box<dyn LogFile>, offset: u64, sync_policy: SyncPolicy) -> Self {
        WALWriter {
            file,
            offset,
            sync_policy,
            writes_since_sync: 0,
        }
    }

    /// Append one encoded transaction.
    ///
    /// Fails with `ShortWrite` if the storage stops accepting bytes before
    /// the whole buffer is written. Never fsyncs; see `sync_if_due`.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match self.file.write(&bytes[written..]) {
                Ok(0) => {
                    self.offset += written as u64;
                    return Err(Error::ShortWrite {
                        expected: bytes.len(),
                        written,
                    });
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.offset += written as u64;
                    return Err(e.into());
                }
            }
        }
        self.file.flush()?;
        self.offset += bytes.len() as u64;
        self.writes_since_sync += 1;
        Ok(())
    }

    /// fsync if the sync policy calls for it after the appends so far.
    ///
    /// By the time this runs the bytes are already in the file, so a failure
    /// here says nothing about whether they will replay.
    pub fn sync_if_due(&mut self) -> Result<()> {
        match self.sync_policy {
            SyncPolicy::EveryWrite => self.sync(),
            SyncPolicy::EveryNWrites(n) if self.writes_since_sync >= n => self.sync(),
            SyncPolicy::EveryNWrites(_) | SyncPolicy::Manual => Ok(()),
        }
    }

    /// Force fsync to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Appends since the last fsync.
    pub fn writes_since_sync(&self) -> usize {
        self.writes_since_sync
    }

    /// Bytes handed to the storage so far, including any partial tail.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
