//! Ledger adapter contract: a versioned key-value store with per-key history.
//!
//! The registry only talks to the ledger through [`Ledger`]. Adapters are responsible
//! for per-key linearizability and for reporting concurrent conflicting writes as
//! [`LedgerError::WriteConflict`]; the registry never retries.
//!
//! # Invariants
//! - History is append-only: every `put` and every `delete` of a live key adds one entry.
//! - A key's history is returned oldest first; a `None` value is a tombstone.
//! - `range_scan` yields live keys in ascending key order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors reported by ledger adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Write conflict on key {key}")]
    WriteConflict { key: String },

    #[error("Ledger storage error: {0}")]
    Storage(String),

    #[error("Corrupt ledger journal at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Ledger lock poisoned")]
    Poisoned,
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Opaque reference to the ledger transaction that wrote a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionRef(String);

impl VersionRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Derives the reference for the `sequence`-th write: SHA-256 over sequence, key and value.
    pub fn derive(sequence: u64, key: &str, value: Option<&[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sequence.to_be_bytes());
        hasher.update(key.as_bytes());
        match value {
            Some(v) => {
                hasher.update([1u8]);
                hasher.update(v);
            }
            None => hasher.update([0u8]),
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One historical write at a key. `value == None` marks a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub version: VersionRef,
    pub value: Option<Vec<u8>>,
}

/// Lazy `(key, value)` sequence produced by [`Ledger::range_scan`].
pub type RangeScan<'a> = Box<dyn Iterator<Item = (String, Vec<u8>)> + Send + 'a>;

/// The storage primitives consumed by the registry.
pub trait Ledger: Send + Sync {
    /// Current live value, or `None` if the key is absent or deleted.
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> LedgerResult<()>;

    /// Removes the live value. Deleting an absent key is a no-op and records nothing.
    fn delete(&self, key: &str) -> LedgerResult<()>;

    /// Every version written at `key`, oldest first. Empty if the key never existed.
    fn history_of(&self, key: &str) -> LedgerResult<Vec<LedgerEntry>>;

    /// Live entries with `start <= key < end`. An empty bound is unbounded.
    fn range_scan(&self, start: &str, end: &str) -> LedgerResult<RangeScan<'_>>;
}

/// Versioned key-value state shared by the in-memory and journal adapters.
///
/// `live` is published as an `Arc` so scans iterate an immutable snapshot without
/// holding the adapter's lock.
#[derive(Debug, Default)]
pub(crate) struct VersionedStore {
    live: Arc<BTreeMap<String, Vec<u8>>>,
    history: HashMap<String, Vec<LedgerEntry>>,
    sequence: u64,
}

impl VersionedStore {
    pub(crate) fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.live.get(key).cloned()
    }

    pub(crate) fn is_live(&self, key: &str) -> bool {
        self.live.contains_key(key)
    }

    /// Number of versions written at `key`; used as the MVCC version of the key.
    pub(crate) fn version_count(&self, key: &str) -> usize {
        self.history.get(key).map(Vec::len).unwrap_or(0)
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Sequence number and reference the next write of `value` at `key` would get.
    pub(crate) fn next_version(&self, key: &str, value: Option<&[u8]>) -> (u64, VersionRef) {
        let seq = self.sequence + 1;
        (seq, VersionRef::derive(seq, key, value))
    }

    /// Records a write. `sequence` must be greater than every sequence applied before.
    pub(crate) fn apply(&mut self, sequence: u64, key: &str, version: VersionRef, value: Option<Vec<u8>>) {
        let live = Arc::make_mut(&mut self.live);
        match &value {
            Some(v) => {
                live.insert(key.to_string(), v.clone());
            }
            None => {
                live.remove(key);
            }
        }
        self.history
            .entry(key.to_string())
            .or_default()
            .push(LedgerEntry { version, value });
        self.sequence = sequence;
    }

    /// Assigns the next version to `value` and applies it.
    pub(crate) fn write(&mut self, key: &str, value: Option<Vec<u8>>) -> VersionRef {
        let (seq, version) = self.next_version(key, value.as_deref());
        self.apply(seq, key, version.clone(), value);
        version
    }

    pub(crate) fn history(&self, key: &str) -> Vec<LedgerEntry> {
        self.history.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn scan(&self, start: &str, end: &str) -> SnapshotScan {
        SnapshotScan::new(Arc::clone(&self.live), start, end)
    }
}

/// Iterator over an immutable snapshot of the live map. Each step is one ordered lookup
/// after the last key returned, so nothing is copied up front.
pub(crate) struct SnapshotScan {
    snapshot: Arc<BTreeMap<String, Vec<u8>>>,
    cursor: Bound<String>,
    end: Option<String>,
}

impl SnapshotScan {
    fn new(snapshot: Arc<BTreeMap<String, Vec<u8>>>, start: &str, end: &str) -> Self {
        Self {
            snapshot,
            cursor: if start.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Included(start.to_string())
            },
            end: if end.is_empty() { None } else { Some(end.to_string()) },
        }
    }
}

impl Iterator for SnapshotScan {
    type Item = (String, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        // BTreeMap::range panics on an empty or inverted range
        if let (Some(end), Bound::Included(k) | Bound::Excluded(k)) = (&self.end, &self.cursor) {
            if k >= end {
                return None;
            }
        }
        let lower = match &self.cursor {
            Bound::Included(k) => Bound::Included(k.as_str()),
            Bound::Excluded(k) => Bound::Excluded(k.as_str()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let upper = match &self.end {
            Some(e) => Bound::Excluded(e.as_str()),
            None => Bound::Unbounded,
        };
        let (key, value) = self.snapshot.range::<str, _>((lower, upper)).next()?;
        let item = (key.clone(), value.clone());
        self.cursor = Bound::Excluded(key.clone());
        Some(item)
    }
}

/// In-memory reference ledger. Thread-safe; every write is atomic under one lock.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    store: RwLock<VersionedStore>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an MVCC session that rejects writes to keys changed since the session read them.
    pub fn session(&self) -> LedgerSession<'_> {
        LedgerSession {
            ledger: self,
            read_versions: Mutex::new(HashMap::new()),
        }
    }

    /// Total number of writes applied so far.
    pub fn write_count(&self) -> LedgerResult<u64> {
        Ok(self.store.read().map_err(|_| LedgerError::Poisoned)?.sequence())
    }

    /// Writes raw bytes without any registry validation; for seeding fixtures.
    pub fn put_raw(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        self.put(key, value)
    }

    /// Applies `value` at `key` if the key's version still equals `expected`.
    fn write_checked(&self, key: &str, value: Option<Vec<u8>>, expected: Option<usize>) -> LedgerResult<usize> {
        let mut store = self.store.write().map_err(|_| LedgerError::Poisoned)?;
        if let Some(expected) = expected {
            if store.version_count(key) != expected {
                return Err(LedgerError::WriteConflict { key: key.to_string() });
            }
        }
        if value.is_none() && !store.is_live(key) {
            return Ok(store.version_count(key));
        }
        store.write(key, value);
        Ok(store.version_count(key))
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.store.read().map_err(|_| LedgerError::Poisoned)?.get(key))
    }

    fn put(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        self.write_checked(key, Some(value.to_vec()), None).map(|_| ())
    }

    fn delete(&self, key: &str) -> LedgerResult<()> {
        self.write_checked(key, None, None).map(|_| ())
    }

    fn history_of(&self, key: &str) -> LedgerResult<Vec<LedgerEntry>> {
        Ok(self.store.read().map_err(|_| LedgerError::Poisoned)?.history(key))
    }

    fn range_scan(&self, start: &str, end: &str) -> LedgerResult<RangeScan<'_>> {
        let scan = self.store.read().map_err(|_| LedgerError::Poisoned)?.scan(start, end);
        Ok(Box::new(scan))
    }
}

/// Optimistic transaction view over a [`MemoryLedger`].
///
/// The first `get` of a key pins the key's version. A later `put`/`delete` of that key
/// fails with `WriteConflict` if any other writer changed it in between. Keys written
/// without a prior read are not checked.
#[derive(Debug)]
pub struct LedgerSession<'a> {
    ledger: &'a MemoryLedger,
    read_versions: Mutex<HashMap<String, usize>>,
}

impl LedgerSession<'_> {
    fn pinned(&self, key: &str) -> LedgerResult<Option<usize>> {
        Ok(self
            .read_versions
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .get(key)
            .copied())
    }

    fn pin(&self, key: &str, version: usize) -> LedgerResult<()> {
        self.read_versions
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .insert(key.to_string(), version);
        Ok(())
    }

    fn write(&self, key: &str, value: Option<Vec<u8>>) -> LedgerResult<()> {
        let expected = self.pinned(key)?;
        let version = self.ledger.write_checked(key, value, expected)?;
        if expected.is_some() {
            self.pin(key, version)?;
        }
        Ok(())
    }
}

impl Ledger for LedgerSession<'_> {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        let store = self.ledger.store.read().map_err(|_| LedgerError::Poisoned)?;
        if self.pinned(key)?.is_none() {
            self.pin(key, store.version_count(key))?;
        }
        Ok(store.get(key))
    }

    fn put(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        self.write(key, Some(value.to_vec()))
    }

    fn delete(&self, key: &str) -> LedgerResult<()> {
        self.write(key, None)
    }

    fn history_of(&self, key: &str) -> LedgerResult<Vec<LedgerEntry>> {
        self.ledger.history_of(key)
    }

    fn range_scan(&self, start: &str, end: &str) -> LedgerResult<RangeScan<'_>> {
        self.ledger.range_scan(start, end)
    }
}
