pub mod add;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use xxhash_rust::xxh3::Xxh3Builder;

use add::{AddRule, CounterAdd};

use crate::types::{CellKey, Timestamp, Value};
use crate::wal::record::{OpKind, Operation, WriteBatch};

/// One entry in a cell's version history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Version {
    Value(Value),
    /// The cell reads as deleted from this timestamp until a newer version.
    Tombstone,
}

type Versions = BTreeMap<Timestamp, Version>;

/// The reconciled in-memory view of every log.
///
/// Each cell maps to its versions ordered by timestamp. Nothing is ever
/// physically removed: a Delete adds a tombstone that hides older versions
/// from reads at or after its timestamp, and a write at an existing
/// timestamp replaces that version.
///
/// A whole transaction is applied under one write lock, so readers see all
/// of it or none of it. Transactions from different logs are not ordered
/// against each other here; callers that need that take a named lock.
pub struct Index {
    cells: RwLock<HashMap<CellKey, Versions, Xxh3Builder>>,
    add_rule: Arc<dyn AddRule>,
}

impl Index {
    /// Create an empty index using counter arithmetic for `Add`.
    pub fn new() -> Self {
        Self::with_add_rule(Arc::new(CounterAdd))
    }

    pub fn with_add_rule(add_rule: Arc<dyn AddRule>) -> Self {
        Index {
            cells: RwLock::new(HashMap::with_hasher(Xxh3Builder::new())),
            add_rule,
        }
    }

    /// Apply every operation of `batch`, in order.
    pub fn merge(&self, batch: &WriteBatch) {
        let mut cells = self.cells.write();
        for op in batch.operations() {
            self.apply(&mut cells, op);
        }
    }

    fn apply(&self, cells: &mut HashMap<CellKey, Versions, Xxh3Builder>, op: &Operation) {
        let ts = op.key().timestamp();
        let versions = cells.entry(op.key().cell()).or_default();

        match op.kind() {
            OpKind::Set => {
                versions.insert(ts, Version::Value(op.value().to_vec()));
            }
            OpKind::Add => {
                let combined = self.add_rule.combine(visible(versions, ts), op.value());
                versions.insert(ts, Version::Value(combined));
            }
            OpKind::Delete => {
                versions.insert(ts, Version::Tombstone);
            }
        }
    }

    /// Newest value of `cell` at or before `at`, unless a tombstone is newer.
    pub fn query(&self, cell: &CellKey, at: Timestamp) -> Option<Value> {
        let cells = self.cells.read();
        cells.get(cell).and_then(|v| visible(v, at)).map(<[u8]>::to_vec)
    }

    /// Every version of `cell`, oldest first, tombstones included.
    pub fn history(&self, cell: &CellKey) -> Vec<(Timestamp, Version)> {
        let cells = self.cells.read();
        cells
            .get(cell)
            .map(|v| v.iter().map(|(ts, ver)| (*ts, ver.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of distinct cells ever written.
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Ordered copy of the whole index.
    pub fn snapshot(&self) -> BTreeMap<CellKey, Vec<(Timestamp, Version)>> {
        let cells = self.cells.read();
        cells
            .iter()
            .map(|(cell, v)| {
                let versions = v.iter().map(|(ts, ver)| (*ts, ver.clone())).collect();
                (cell.clone(), versions)
            })
            .collect()
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

fn visible(versions: &Versions, at: Timestamp) -> Option<&[u8]> {
    match versions.range(..=at).next_back() {
        Some((_, Version::Value(v))) => Some(v.as_slice()),
        _ => None,
    }
}
