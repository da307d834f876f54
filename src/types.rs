use std::io::{Cursor, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Raw value bytes. The engine never interprets them, except through an
/// `AddRule` when merging `Add` operations.
pub type Value = Vec<u8>;

/// Nanoseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time in nanoseconds. A clock set before the epoch
/// reads as 0.
pub fn now_nanos() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Address of a cell before timestamp versioning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub table: String,
    pub row: String,
    pub column: String,
    pub qualifier: Option<String>,
}

impl CellKey {
    pub fn new(
        table: impl Into<String>,
        row: impl Into<String>,
        column: impl Into<String>,
        qualifier: Option<&str>,
    ) -> Self {
        CellKey {
            table: table.into(),
            row: row.into(),
            column: column.into(),
            qualifier: qualifier.map(str::to_owned),
        }
    }
}

/// A fully qualified cell version: `(table, row, column, qualifier, timestamp)`.
///
/// On-disk format (all lengths u32 big-endian):
/// ```text
/// ┌─────────┬───────┬─────────┬─────┬─────────┬────────┬─────────┬───────────┬────────┐
/// │ len(4B) │ table │ len(4B) │ row │ len(4B) │ column │ len(4B) │ qualifier │ ts(8B) │
/// └─────────┴───────┴─────────┴─────┴─────────┴────────┴─────────┴───────────┴────────┘
/// ```
///
/// An absent qualifier is written as an empty string, and an empty string
/// decodes as absent. `Some("")` therefore does not survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    table: String,
    row: String,
    column: String,
    qualifier: Option<String>,
    timestamp: Timestamp,
}

const LEN_SIZE: usize = 4;
const TIMESTAMP_SIZE: usize = 8;

impl Key {
    /// Build a key stamped with the current time.
    pub fn new(table: impl Into<String>, row: impl Into<String>, column: impl Into<String>) -> Self {
        Key {
            table: table.into(),
            row: row.into(),
            column: column.into(),
            qualifier: None,
            timestamp: now_nanos(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Replace the timestamp.
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn row(&self) -> &str {
        &self.row
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The cell this key versions.
    pub fn cell(&self) -> CellKey {
        CellKey {
            table: self.table.clone(),
            row: self.row.clone(),
            column: self.column.clone(),
            qualifier: self.qualifier.clone(),
        }
    }

    /// Size of this key when serialized.
    pub fn encoded_size(&self) -> usize {
        4 * LEN_SIZE
            + self.table.len()
            + self.row.len()
            + self.column.len()
            + self.qualifier.as_deref().map_or(0, str::len)
            + TIMESTAMP_SIZE
    }

    /// Fails with `FieldTooLarge` if a field is longer than a u32 prefix
    /// can describe.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        put_str(&mut buf, "key table", &self.table)?;
        put_str(&mut buf, "key row", &self.row)?;
        put_str(&mut buf, "key column", &self.column)?;
        put_str(&mut buf, "key qualifier", self.qualifier.as_deref().unwrap_or(""))?;
        buf.write_u64::<BigEndian>(self.timestamp)?;
        Ok(buf)
    }

    /// Decode a key that must occupy `data` exactly.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let table = get_str(&mut cursor, "table")?;
        let row = get_str(&mut cursor, "row")?;
        let column = get_str(&mut cursor, "column")?;
        let qualifier = get_str(&mut cursor, "qualifier")?;
        let timestamp = cursor
            .read_u64::<BigEndian>()
            .map_err(|_| Error::CorruptOperation("key timestamp truncated".into()))?;

        if cursor.position() as usize != data.len() {
            return Err(Error::CorruptOperation(format!(
                "{} trailing bytes after key",
                data.len() - cursor.position() as usize
            )));
        }

        Ok(Key {
            table,
            row,
            column,
            qualifier: (!qualifier.is_empty()).then_some(qualifier),
            timestamp,
        })
    }
}

/// Convert a length to its on-disk u32 prefix.
pub fn wire_len(field: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::FieldTooLarge { field, len })
}

fn put_str(buf: &mut Vec<u8>, field: &'static str, s: &str) -> Result<()> {
    buf.write_u32::<BigEndian>(wire_len(field, s.len())?)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn get_str(cursor: &mut Cursor<&[u8]>, field: &str) -> Result<String> {
    let len = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| Error::CorruptOperation(format!("key {field} length truncated")))?
        as usize;

    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(Error::CorruptOperation(format!(
            "key {field} length {len} exceeds remaining {remaining} bytes"
        )));
    }

    let mut bytes = vec![0u8; len];
    cursor
        .read_exact(&mut bytes)
        .map_err(|_| Error::CorruptOperation(format!("key {field} truncated")))?;

    String::from_utf8(bytes)
        .map_err(|_| Error::CorruptOperation(format!("key {field} is not valid UTF-8")))
}
