use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::error::Result;
use crate::wal::record::WriteBatch;

/// Reads encoded transactions back from a log for replay.
///
/// Loads the entire file into memory, then decodes transaction by
/// transaction until the end of the data. Unlike a checksummed WAL there is
/// no "stop quietly at the first bad record": a log that does not decode all
/// the way to its recorded length cannot be reconciled with the index, so
/// the error is handed to the caller.
pub struct WALReader {
    data: Vec<u8>,
}

impl WALReader {
    /// Open a log file for reading.
    pub fn new(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(WALReader { data })
    }

    /// Read from bytes already in memory.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        WALReader { data }
    }

    /// Total bytes available to replay.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over every transaction in the log.
    pub fn iter(&self) -> WALIterator<'_> {
        WALIterator {
            cursor: Cursor::new(self.data.as_slice()),
            failed: false,
        }
    }
}

/// Iterator over decoded transactions, paired with the offset each one
/// starts at. Yields at most one error, then ends.
pub struct WALIterator<'a> {
    cursor: Cursor<&'a [u8]>,
    failed: bool,
}

impl WALIterator<'_> {
    /// Offset of the next record to decode.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }
}

impl Iterator for WALIterator<'_> {
    type Item = Result<(u64, WriteBatch)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.position() >= self.cursor.get_ref().len() as u64 {
            return None;
        }

        let offset = self.cursor.position();
        match WriteBatch::decode(&mut self.cursor) {
            Ok(batch) => Some(Ok((offset, batch))),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
