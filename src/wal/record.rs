use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Error, Result};
use crate::types::{Key, Value, wire_len};

/// Marker byte opening every encoded operation.
pub const OPERATION_MARKER: u8 = 0x4F;
/// Marker byte opening every encoded transaction.
pub const TRANSACTION_MARKER: u8 = 0x54;

const MARKER_SIZE: usize = 1;
const KIND_SIZE: usize = 1;
const LEN_SIZE: usize = 4;
const OPERATION_HEADER_SIZE: usize = MARKER_SIZE + KIND_SIZE + LEN_SIZE + LEN_SIZE;
pub const TRANSACTION_HEADER_SIZE: usize = MARKER_SIZE + LEN_SIZE + LEN_SIZE;

/// Kind of mutation carried by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Set = 0x01,
    Add = 0x02,
    Delete = 0x03,
}

impl OpKind {
    fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(OpKind::Set),
            0x02 => Ok(OpKind::Add),
            0x03 => Ok(OpKind::Delete),
            _ => Err(Error::CorruptOperation(format!("invalid operation kind: {byte}"))),
        }
    }
}

/// One mutation against one key.
///
/// On-disk format (lengths u32 big-endian):
/// ```text
/// ┌────────────┬──────────┬─────────────┬─────────────┬───────────┬─────────────┐
/// │ Marker(1B) │ Kind(1B) │ Key Len(4B) │ Val Len(4B) │ Key (var) │ Value (var) │
/// └────────────┴──────────┴─────────────┴─────────────┴───────────┴─────────────┘
/// ```
///
/// A Delete always has a zero value length and no value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    kind: OpKind,
    key: Key,
    value: Value,
}

impl Operation {
    pub fn set(key: Key, value: Value) -> Self {
        Operation {
            kind: OpKind::Set,
            key,
            value,
        }
    }

    pub fn add(key: Key, value: Value) -> Self {
        Operation {
            kind: OpKind::Add,
            key,
            value,
        }
    }

    pub fn delete(key: Key) -> Self {
        Operation {
            kind: OpKind::Delete,
            key,
            value: Vec::new(),
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Value bytes; empty for a Delete.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Size of this operation when serialized.
    pub fn encoded_size(&self) -> usize {
        OPERATION_HEADER_SIZE + self.key.encoded_size() + self.value.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        let key = self.key.encode()?;

        buf.write_u8(OPERATION_MARKER)?;
        buf.write_u8(self.kind as u8)?;
        buf.write_u32::<BigEndian>(wire_len("key", key.len())?)?;
        buf.write_u32::<BigEndian>(wire_len("value", self.value.len())?)?;
        buf.write_all(&key)?;
        buf.write_all(&self.value)?;
        Ok(())
    }

    /// Read exactly one operation from `reader`.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; OPERATION_HEADER_SIZE];
        read_full(reader, &mut header)?;

        if header[0] != OPERATION_MARKER {
            return Err(Error::CorruptOperation(format!(
                "bad marker byte {:#04x}",
                header[0]
            )));
        }

        let kind = OpKind::from_u8(header[1])?;
        let key_len = BigEndian::read_u32(&header[2..6]) as usize;
        let value_len = BigEndian::read_u32(&header[6..10]) as usize;

        if kind == OpKind::Delete && value_len != 0 {
            return Err(Error::CorruptOperation(format!(
                "delete carries a {value_len} byte value"
            )));
        }

        let key = Key::decode(&read_vec(reader, key_len)?)?;
        let value = read_vec(reader, value_len)?;

        Ok(Operation { kind, key, value })
    }
}

/// The wire form of a transaction: an ordered, non-empty list of operations.
///
/// On-disk format (u32 big-endian):
/// ```text
/// ┌────────────┬──────────────┬────────────┬────────────────────────┐
/// │ Marker(1B) │ Length(4B)   │ Count(4B)  │ Operation × Count      │
/// └────────────┴──────────────┴────────────┴────────────────────────┘
/// ```
///
/// `Length` is the byte count of the concatenated operations. A decoder that
/// consumes a different number of bytes for `Count` operations rejects the
/// record, which catches truncation as well as an inconsistent header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<Operation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch { ops: Vec::new() }
    }

    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Size of this batch when serialized.
    pub fn encoded_size(&self) -> usize {
        TRANSACTION_HEADER_SIZE + self.payload_size()
    }

    fn payload_size(&self) -> usize {
        self.ops.iter().map(Operation::encoded_size).sum()
    }

    /// Serialize the batch. Any length that overflows its u32 field fails
    /// the whole encode with `FieldTooLarge`, so nothing unreplayable is
    /// ever produced.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload_len = self.payload_size();
        let mut buf = Vec::with_capacity(TRANSACTION_HEADER_SIZE + payload_len);

        buf.write_u8(TRANSACTION_MARKER)?;
        buf.write_u32::<BigEndian>(wire_len("transaction payload", payload_len)?)?;
        buf.write_u32::<BigEndian>(wire_len("operation count", self.ops.len())?)?;
        for op in &self.ops {
            op.encode_into(&mut buf)?;
        }

        Ok(buf)
    }

    /// Read exactly one transaction from `reader`.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; TRANSACTION_HEADER_SIZE];
        read_full(reader, &mut header)?;

        if header[0] != TRANSACTION_MARKER {
            return Err(Error::CorruptTransaction(format!(
                "bad marker byte {:#04x}",
                header[0]
            )));
        }

        let payload_len = BigEndian::read_u32(&header[1..5]) as u64;
        let count = BigEndian::read_u32(&header[5..9]) as usize;
        if count == 0 {
            return Err(Error::CorruptTransaction("zero operations".into()));
        }

        let mut counting = CountingReader {
            inner: reader,
            consumed: 0,
        };
        let mut ops = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            ops.push(Operation::decode(&mut counting)?);
        }

        if counting.consumed != payload_len {
            return Err(Error::CorruptTransaction(format!(
                "declared {payload_len} payload bytes, operations used {}",
                counting.consumed
            )));
        }

        Ok(WriteBatch { ops })
    }
}

impl From<Vec<Operation>> for WriteBatch {
    fn from(ops: Vec<Operation>) -> Self {
        WriteBatch { ops }
    }
}

impl FromIterator<Operation> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        WriteBatch {
            ops: iter.into_iter().collect(),
        }
    }
}

struct CountingReader<'a, R> {
    inner: &'a mut R,
    consumed: u64,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

/// Fill `buf` completely; running out of input is `UnexpectedEndOfLog`.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::UnexpectedEndOfLog {
                    needed: buf.len() - filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
fn read_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    Read::take(&mut *reader, len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(Error::UnexpectedEndOfLog {
            needed: len - buf.len(),
        });
    }
    Ok(buf)
}
