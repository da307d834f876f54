/// How an `Add` operation combines its delta with the value already visible
/// in the cell.
///
/// `base` is the newest non-tombstoned version at or before the add's
/// timestamp, or `None` if there is none. Implementations must be
/// deterministic: replay calls them again and must land on the same bytes.
pub trait AddRule: Send + Sync {
    fn combine(&self, base: Option<&[u8]>, delta: &[u8]) -> Vec<u8>;
}

/// Signed 64-bit counter arithmetic over `counter::encode`d values.
///
/// A missing base counts as 0. Bytes that aren't exactly 8 long also read as
/// 0, so a counter written over a non-counter value restarts from the delta.
/// Overflow wraps.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterAdd;

impl AddRule for CounterAdd {
    fn combine(&self, base: Option<&[u8]>, delta: &[u8]) -> Vec<u8> {
        let base = base.and_then(counter::decode).unwrap_or(0);
        let delta = counter::decode(delta).unwrap_or(0);
        counter::encode(base.wrapping_add(delta))
    }
}

/// Value form understood by `CounterAdd`: 8-byte big-endian two's complement.
pub mod counter {
    pub fn encode(n: i64) -> Vec<u8> {
        n.to_be_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Option<i64> {
        <[u8; 8]>::try_from(bytes).ok().map(i64::from_be_bytes)
    }
}
