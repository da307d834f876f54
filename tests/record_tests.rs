// Operation and transaction record tests
// Marker bytes, big-endian headers and the payload-length cross-check.

use std::io::Cursor;

use celldb::wal::record::{OPERATION_MARKER, TRANSACTION_HEADER_SIZE, TRANSACTION_MARKER};
use celldb::wal::{OpKind, Operation, WriteBatch};
use celldb::types::wire_len;
use celldb::{Error, Key};
use proptest::prelude::*;

fn sample_batch() -> WriteBatch {
    vec![
        Operation::set(Key::new("users", "u1", "name").at(100), b"alice".to_vec()),
        Operation::add(Key::new("stats", "page1", "views").at(10), 1i64.to_be_bytes().to_vec()),
        Operation::delete(Key::new("users", "u1", "email").with_qualifier("work").at(300)),
    ]
    .into()
}

// =============================================================================
// Test 1: Each operation kind survives encode/decode
// =============================================================================
#[test]
fn encode_decode_each_kind() {
    for op in sample_batch().operations() {
        let encoded = op.encode().unwrap();
        let decoded = Operation::decode(&mut Cursor::new(&encoded)).unwrap();

        assert_eq!(&decoded, op);
        assert_eq!(op.encoded_size(), encoded.len());
    }
}

// =============================================================================
// Test 2: Operation header layout
// =============================================================================
#[test]
fn operation_header_layout() {
    let key = Key::new("t", "r", "c").at(1);
    let op = Operation::set(key.clone(), b"xyz".to_vec());
    let encoded = op.encode().unwrap();

    assert_eq!(encoded[0], OPERATION_MARKER);
    assert_eq!(encoded[1], OpKind::Set as u8);
    assert_eq!(&encoded[2..6], &(key.encoded_size() as u32).to_be_bytes());
    assert_eq!(&encoded[6..10], &3u32.to_be_bytes());
    assert_eq!(&encoded[encoded.len() - 3..], b"xyz");
}

// =============================================================================
// Test 3: Delete carries no value bytes
// =============================================================================
#[test]
fn delete_has_zero_value_length() {
    let key = Key::new("t", "r", "c").at(1);
    let encoded = Operation::delete(key.clone()).encode().unwrap();

    assert_eq!(encoded[1], 3);
    assert_eq!(&encoded[6..10], &[0, 0, 0, 0]);
    assert_eq!(encoded.len(), 10 + key.encoded_size());
}

// =============================================================================
// Test 4: Bad operation marker and kind are corrupt
// =============================================================================
#[test]
fn bad_operation_marker_or_kind() {
    let encoded = Operation::set(Key::new("t", "r", "c").at(1), b"v".to_vec()).encode().unwrap();

    let mut bad_marker = encoded.clone();
    bad_marker[0] = 0x00;
    assert!(matches!(
        Operation::decode(&mut Cursor::new(&bad_marker)),
        Err(Error::CorruptOperation(_))
    ));

    let mut bad_kind = encoded;
    bad_kind[1] = 9;
    assert!(matches!(
        Operation::decode(&mut Cursor::new(&bad_kind)),
        Err(Error::CorruptOperation(_))
    ));
}

// =============================================================================
// Test 5: Short operation is an unexpected end, never zero-filled
// =============================================================================
#[test]
fn truncated_operation_is_unexpected_end() {
    let encoded = Operation::set(Key::new("t", "r", "c").at(1), b"value".to_vec()).encode().unwrap();

    for cut in [1, 9, encoded.len() - 1] {
        let result = Operation::decode(&mut Cursor::new(&encoded[..cut]));
        assert!(matches!(result, Err(Error::UnexpectedEndOfLog { .. })), "cut at {cut}");
    }
}

// =============================================================================
// Test 6: Transaction round trip and header layout
// =============================================================================
#[test]
fn transaction_round_trip_and_header() {
    let batch = sample_batch();
    let encoded = batch.encode().unwrap();

    let payload: usize = batch.operations().iter().map(Operation::encoded_size).sum();
    assert_eq!(encoded[0], TRANSACTION_MARKER);
    assert_eq!(&encoded[1..5], &(payload as u32).to_be_bytes());
    assert_eq!(&encoded[5..9], &3u32.to_be_bytes());
    assert_eq!(encoded.len(), TRANSACTION_HEADER_SIZE + payload);
    assert_eq!(batch.encoded_size(), encoded.len());

    let decoded = WriteBatch::decode(&mut Cursor::new(&encoded)).unwrap();
    assert_eq!(decoded, batch);
}

// =============================================================================
// Test 7: Declared length that disagrees with the operations is corrupt
// =============================================================================
#[test]
fn payload_length_mismatch_is_corrupt() {
    let encoded = sample_batch().encode().unwrap();
    let declared = u32::from_be_bytes(encoded[1..5].try_into().unwrap());

    for wrong in [declared - 1, declared + 1] {
        let mut bad = encoded.clone();
        bad[1..5].copy_from_slice(&wrong.to_be_bytes());
        assert!(matches!(
            WriteBatch::decode(&mut Cursor::new(&bad)),
            Err(Error::CorruptTransaction(_))
        ));
    }
}

// =============================================================================
// Test 8: Bad transaction marker or zero count is corrupt
// =============================================================================
#[test]
fn bad_transaction_marker_or_empty() {
    let mut bad_marker = sample_batch().encode().unwrap();
    bad_marker[0] = OPERATION_MARKER;
    assert!(matches!(
        WriteBatch::decode(&mut Cursor::new(&bad_marker)),
        Err(Error::CorruptTransaction(_))
    ));

    let empty = [TRANSACTION_MARKER, 0, 0, 0, 0, 0, 0, 0, 0];
    assert!(matches!(
        WriteBatch::decode(&mut Cursor::new(&empty[..])),
        Err(Error::CorruptTransaction(_))
    ));
}

// =============================================================================
// Test 9: Count larger than the operations present runs off the end
// =============================================================================
#[test]
fn count_beyond_data_is_unexpected_end() {
    let mut encoded = sample_batch().encode().unwrap();
    encoded[5..9].copy_from_slice(&4u32.to_be_bytes());

    assert!(matches!(
        WriteBatch::decode(&mut Cursor::new(&encoded)),
        Err(Error::UnexpectedEndOfLog { .. })
    ));
}

// =============================================================================
// Test 10: Consecutive transactions decode from one stream
// =============================================================================
#[test]
fn consecutive_transactions_from_one_stream() {
    let first = sample_batch();
    let second: WriteBatch = vec![Operation::set(Key::new("a", "b", "c").at(2), b"d".to_vec())].into();

    let mut stream = first.encode().unwrap();
    stream.extend_from_slice(&second.encode().unwrap());
    let mut cursor = Cursor::new(&stream);

    assert_eq!(WriteBatch::decode(&mut cursor).unwrap(), first);
    assert_eq!(WriteBatch::decode(&mut cursor).unwrap(), second);
    assert_eq!(cursor.position() as usize, stream.len());
}

// =============================================================================
// Test 11: Lengths past u32::MAX are refused instead of wrapping
// =============================================================================
#[test]
fn lengths_beyond_u32_rejected() {
    let max = u32::MAX as usize;

    assert_eq!(wire_len("value", 0).unwrap(), 0);
    assert_eq!(wire_len("value", max).unwrap(), u32::MAX);

    for len in [max + 1, max + 2, usize::MAX] {
        match wire_len("value", len) {
            Err(Error::FieldTooLarge { field, len: got }) => {
                assert_eq!(field, "value");
                assert_eq!(got, len);
            }
            other => panic!("expected FieldTooLarge for {len}, got {other:?}"),
        }
    }
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    (
        0u8..3,
        "[a-z]{0,8}",
        "[a-z0-9]{0,8}",
        "[a-z]{0,8}",
        proptest::option::of("[a-z]{1,4}"),
        any::<u64>(),
        proptest::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(|(kind, table, row, column, qualifier, ts, value)| {
            let mut key = Key::new(table, row, column).at(ts);
            if let Some(q) = qualifier {
                key = key.with_qualifier(q);
            }
            match kind {
                0 => Operation::set(key, value),
                1 => Operation::add(key, value),
                _ => Operation::delete(key),
            }
        })
}

proptest! {
    #[test]
    fn transaction_round_trips(ops in proptest::collection::vec(arb_operation(), 1..16)) {
        let batch = WriteBatch::from(ops);
        let encoded = batch.encode().unwrap();
        let decoded = WriteBatch::decode(&mut Cursor::new(&encoded)).unwrap();
        prop_assert_eq!(decoded, batch);
    }
}
