//! Audit trail of an asset key: every version ever written, oldest first.

use crate::core::asset::{AssetRecord, AssetStatus};
use crate::core::codec;
use crate::core::ledger::{LedgerEntry, VersionRef};

/// State of the key after one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Version {
    Record(AssetRecord),
    /// The live value was deleted by this write.
    Tombstone,
    /// The stored bytes no longer decode. Kept in the trail instead of failing the audit.
    Unreadable { reason: String },
}

impl Version {
    pub fn record(&self) -> Option<&AssetRecord> {
        match self {
            Version::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Version::Tombstone)
    }

    pub fn status(&self) -> Option<AssetStatus> {
        self.record().map(AssetRecord::status)
    }
}

/// One `(versionRef, record-or-tombstone)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub version: VersionRef,
    pub state: Version,
}

impl HistoryEntry {
    pub(crate) fn from_ledger(entry: LedgerEntry) -> Self {
        let state = match entry.value {
            None => Version::Tombstone,
            Some(bytes) if bytes.is_empty() => Version::Tombstone,
            Some(bytes) => match codec::decode(&bytes) {
                Ok(record) => Version::Record(record),
                Err(e) => Version::Unreadable { reason: e.to_string() },
            },
        };
        Self {
            version: entry.version,
            state,
        }
    }
}

/// Splits a key's trail into lineages: each `create` after a deletion starts a new one.
pub fn lineages(history: &[HistoryEntry]) -> Vec<&[HistoryEntry]> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, entry) in history.iter().enumerate() {
        if entry.state.is_tombstone() {
            out.push(&history[start..=i]);
            start = i + 1;
        }
    }
    if start < history.len() {
        out.push(&history[start..]);
    }
    out
}
