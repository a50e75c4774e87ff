//! File-backed ledger: an append-only JSON-lines journal replayed on open.
//!
//! Each line is one write: `{"seq":N,"key":"..","version":"..","value":"<hex>"|null}`.
//! The journal is the durable state; the in-memory index is rebuilt from it on every
//! open, so a reopened ledger answers `get`, `history_of` and `range_scan` exactly as
//! before. Lines are appended before the index is updated. A failed append truncates
//! the file back to its previous length and leaves the index untouched.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use crate::core::ledger::{Ledger, LedgerEntry, LedgerError, LedgerResult, RangeScan, VersionRef, VersionedStore};

#[derive(Debug, Serialize, Deserialize)]
struct JournalLine {
    seq: u64,
    key: String,
    version: String,
    value: Option<String>,
}

#[derive(Debug)]
struct JournalState {
    store: VersionedStore,
    file: File,
}

/// Durable [`Ledger`] backed by a journal file.
#[derive(Debug)]
pub struct JournalLedger {
    path: PathBuf,
    state: Mutex<JournalState>,
}

impl JournalLedger {
    /// Opens (creating if needed) the journal at `path` and replays it.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::Storage(format!("cannot open {}: {}", path.display(), e)))?;

        let store = replay(&file)?;
        Ok(Self {
            path,
            state: Mutex::new(JournalState { store, file }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, JournalState>> {
        self.state.lock().map_err(|_| LedgerError::Poisoned)
    }

    fn append(&self, key: &str, value: Option<Vec<u8>>) -> LedgerResult<()> {
        let mut state = self.lock()?;
        if value.is_none() && !state.store.is_live(key) {
            return Ok(());
        }
        let (seq, version) = state.store.next_version(key, value.as_deref());
        let line = JournalLine {
            seq,
            key: key.to_string(),
            version: version.as_str().to_string(),
            value: value.as_ref().map(hex::encode),
        };
        let mut encoded = serde_json::to_vec(&line)
            .map_err(|e| LedgerError::Storage(format!("cannot encode journal line: {}", e)))?;
        encoded.push(b'\n');
        append_line(&mut state.file, &encoded)
            .map_err(|e| LedgerError::Storage(format!("cannot append to {}: {}", self.path.display(), e)))?;
        state.store.apply(seq, key, version, value);
        Ok(())
    }
}

fn append_line(file: &mut File, line: &[u8]) -> io::Result<()> {
    let len = file.metadata()?.len();
    let written = file.write_all(line).and_then(|_| file.sync_data());
    truncate_on_error(file, len, written)
}

/// Cuts the file back to `len` when `written` failed, so no partial line is left for replay.
fn truncate_on_error(file: &File, len: u64, written: io::Result<()>) -> io::Result<()> {
    if let Err(e) = written {
        file.set_len(len)?;
        return Err(e);
    }
    Ok(())
}

fn replay(file: &File) -> LedgerResult<VersionedStore> {
    let mut store = VersionedStore::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| LedgerError::Storage(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let corrupt = |reason: String| LedgerError::Corrupt { line: line_no, reason };
        let entry: JournalLine = serde_json::from_str(&line).map_err(|e| corrupt(e.to_string()))?;
        if entry.seq <= store.sequence() {
            return Err(corrupt(format!(
                "sequence {} does not follow {}",
                entry.seq,
                store.sequence()
            )));
        }
        let value = entry
            .value
            .map(hex::decode)
            .transpose()
            .map_err(|e| corrupt(format!("value is not hex: {}", e)))?;
        store.apply(entry.seq, &entry.key, VersionRef::new(entry.version), value);
    }
    Ok(store)
}

impl Ledger for JournalLedger {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.lock()?.store.get(key))
    }

    fn put(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        self.append(key, Some(value.to_vec()))
    }

    fn delete(&self, key: &str) -> LedgerResult<()> {
        self.append(key, None)
    }

    fn history_of(&self, key: &str) -> LedgerResult<Vec<LedgerEntry>> {
        Ok(self.lock()?.store.history(key))
    }

    fn range_scan(&self, start: &str, end: &str) -> LedgerResult<RangeScan<'_>> {
        let scan = self.lock()?.store.scan(start, end);
        Ok(Box::new(scan))
    }
}
