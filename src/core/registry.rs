//! Asset registry: lifecycle operations over a ledger.
//!
//! Every operation is a single read-validate-write against one key. The registry keeps
//! no mutable state of its own; the ledger serializes conflicting writes and reports
//! them as `WriteConflict`, which is returned to the caller unchanged.
//!
//! Subsidiary moves live in `transfer.rs` as the second half of this `impl`.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::core::asset::{AssetFields, AssetRecord, AssetStatus};
use crate::core::codec;
use crate::core::history::HistoryEntry;
use crate::core::ledger::{Ledger, RangeScan};
use crate::error::{PpeError, Result};

/// Prefix of registry-generated asset ids.
pub const GENERATED_ID_PREFIX: &str = "PPE-";

/// How asset ids are assigned. Exactly one scheme is active per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdScheme {
    /// The caller supplies the subsidiary inventory number.
    #[default]
    InventoryNumber,
    /// The registry generates `PPE-<uuid>` ids.
    Generated,
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdScheme::InventoryNumber => f.write_str("inventory"),
            IdScheme::Generated => f.write_str("generated"),
        }
    }
}

impl FromStr for IdScheme {
    type Err = PpeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inventory" | "inventory-number" | "inventory_number" => Ok(IdScheme::InventoryNumber),
            "generated" | "uuid" => Ok(IdScheme::Generated),
            other => Err(PpeError::Config(format!(
                "unknown id scheme '{}' (expected 'inventory' or 'generated')",
                other
            ))),
        }
    }
}

/// Replacement payload for `update`.
///
/// `fields` always replaces the mutable attributes. `status` and `current_subsidiary`
/// are corrections applied only when set; moves between subsidiaries go through
/// `transfer`/`apply_transfer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpdate {
    pub fields: AssetFields,
    pub status: Option<AssetStatus>,
    pub current_subsidiary: Option<String>,
}

impl AssetUpdate {
    pub fn fields(fields: AssetFields) -> Self {
        Self {
            fields,
            status: None,
            current_subsidiary: None,
        }
    }
}

impl From<AssetFields> for AssetUpdate {
    fn from(fields: AssetFields) -> Self {
        Self::fields(fields)
    }
}

/// Stateless front end to the asset ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetRegistry {
    id_scheme: IdScheme,
}

impl AssetRegistry {
    pub fn new(id_scheme: IdScheme) -> Self {
        Self { id_scheme }
    }

    pub fn id_scheme(&self) -> IdScheme {
        self.id_scheme
    }

    /// Issues a new asset. Status starts as `InService` with no previous subsidiary.
    ///
    /// Under `IdScheme::InventoryNumber` the caller must pass the id; under
    /// `IdScheme::Generated` it must not.
    pub fn create<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        id: Option<&str>,
        fields: AssetFields,
        subsidiary: &str,
    ) -> Result<AssetRecord> {
        let id = self.assign_id(id)?;
        fields.validate()?;

        if self.live_value(ledger, &id)?.is_some() {
            return Err(PpeError::AlreadyExists { id });
        }

        let record = AssetRecord::issue(id, fields, subsidiary)?;
        self.store(ledger, &record)?;
        info!(
            id = %record.id(),
            subsidiary = %record.current_subsidiary(),
            owner = %record.owner_employee_id(),
            "asset created"
        );
        Ok(record)
    }

    /// Current value of an asset.
    pub fn read<L: Ledger + ?Sized>(&self, ledger: &L, id: &str) -> Result<AssetRecord> {
        let record = self.load(ledger, id)?;
        debug!(id = %id, status = %record.status(), "asset read");
        Ok(record)
    }

    /// True if `id` has a non-empty live value. Ledger failures count as absent.
    pub fn exists<L: Ledger + ?Sized>(&self, ledger: &L, id: &str) -> bool {
        match self.live_value(ledger, id) {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!(id = %id, error = %e, "existence check failed, treating asset as absent");
                false
            }
        }
    }

    /// Replaces the mutable attributes of an asset, keeping its id.
    ///
    /// Allowed on `InService` and `PendingTransfer` records. While a transfer is pending
    /// only `fields` may change.
    pub fn update<L: Ledger + ?Sized>(&self, ledger: &L, id: &str, update: AssetUpdate) -> Result<AssetRecord> {
        let current = self.load(ledger, id)?;
        update.fields.validate()?;

        let from = current.status();
        if from == AssetStatus::Retired {
            return Err(invalid(id, from, "update a retired asset"));
        }
        if update.status == Some(AssetStatus::PendingTransfer) {
            return Err(invalid(id, from, "set PendingTransfer through update"));
        }
        let overrides = update.status.is_some() || update.current_subsidiary.is_some();
        if from == AssetStatus::PendingTransfer && overrides {
            return Err(invalid(id, from, "override status or subsidiary"));
        }

        let mut next = current.with_fields(update.fields);
        if let Some(subsidiary) = update.current_subsidiary {
            if subsidiary.trim().is_empty() {
                return Err(PpeError::Validation(format!(
                    "currentSubsidiary of asset {} must be non-empty",
                    id
                )));
            }
            next = next.with_current_subsidiary(subsidiary);
        }
        if let Some(status) = update.status {
            next = next.with_status(status);
        }

        self.store(ledger, &next)?;
        info!(id = %id, status = %next.status(), "asset updated");
        Ok(next)
    }

    /// Removes the live value. Prior versions stay in the ledger history.
    /// A live value that no longer decodes can still be deleted.
    pub fn delete<L: Ledger + ?Sized>(&self, ledger: &L, id: &str) -> Result<()> {
        let bytes = self
            .live_value(ledger, id)?
            .ok_or_else(|| PpeError::NotFound { id: id.to_string() })?;
        ledger.delete(id)?;
        match decode_at(id, &bytes) {
            Ok(last) => info!(id = %id, last_status = %last.status(), "asset deleted"),
            Err(e) => warn!(id = %id, error = %e, "malformed asset deleted"),
        }
        Ok(())
    }

    /// Every live asset in key order. Decoding is lazy; entries that are empty or fail
    /// to decode are logged and skipped. Call again to restart from the beginning.
    pub fn list<'a, L: Ledger + ?Sized>(&self, ledger: &'a L) -> Result<AssetIter<'a>> {
        let scan = ledger.range_scan("", "")?;
        Ok(AssetIter { scan, skipped: 0 })
    }

    /// Every version ever written at `id`, oldest first, including tombstones.
    pub fn history<L: Ledger + ?Sized>(&self, ledger: &L, id: &str) -> Result<Vec<HistoryEntry>> {
        let entries = ledger.history_of(id)?;
        if entries.is_empty() {
            return Err(PpeError::NotFound { id: id.to_string() });
        }
        debug!(id = %id, versions = entries.len(), "asset history read");
        Ok(entries.into_iter().map(HistoryEntry::from_ledger).collect())
    }

    fn assign_id(&self, supplied: Option<&str>) -> Result<String> {
        match (self.id_scheme, supplied) {
            (IdScheme::InventoryNumber, Some(id)) if !id.trim().is_empty() => Ok(id.to_string()),
            (IdScheme::InventoryNumber, _) => Err(PpeError::Validation(
                "an inventory number is required to create an asset".to_string(),
            )),
            (IdScheme::Generated, None) => Ok(generate_id()),
            (IdScheme::Generated, Some(id)) => Err(PpeError::Validation(format!(
                "asset ids are generated by the registry; refusing caller-supplied id '{}'",
                id
            ))),
        }
    }

    fn live_value<L: Ledger + ?Sized>(&self, ledger: &L, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(ledger.get(id)?.filter(|v| !v.is_empty()))
    }

    /// Reads and decodes the live value at `id`.
    pub(crate) fn load<L: Ledger + ?Sized>(&self, ledger: &L, id: &str) -> Result<AssetRecord> {
        let bytes = self
            .live_value(ledger, id)?
            .ok_or_else(|| PpeError::NotFound { id: id.to_string() })?;
        decode_at(id, &bytes)
    }

    pub(crate) fn store<L: Ledger + ?Sized>(&self, ledger: &L, record: &AssetRecord) -> Result<()> {
        let bytes = codec::encode(record)?;
        ledger.put(record.id(), &bytes)?;
        Ok(())
    }
}

/// Decodes the value stored under `key`; a record filed under another id is malformed.
fn decode_at(key: &str, bytes: &[u8]) -> Result<AssetRecord> {
    let record = codec::decode(bytes).map_err(|e| e.with_id(key))?;
    if record.id() != key {
        return Err(PpeError::MalformedRecord {
            id: Some(key.to_string()),
            reason: format!("stored id '{}' does not match its key", record.id()),
        });
    }
    Ok(record)
}

fn generate_id() -> String {
    format!(
        "{}{}",
        GENERATED_ID_PREFIX,
        Uuid::new_v4().simple().to_string().to_ascii_uppercase()
    )
}

pub(crate) fn invalid(id: &str, from: AssetStatus, action: &'static str) -> PpeError {
    PpeError::InvalidTransition {
        id: id.to_string(),
        from,
        action,
    }
}

/// Lazy, single-pass sequence of live assets returned by [`AssetRegistry::list`].
pub struct AssetIter<'a> {
    scan: RangeScan<'a>,
    skipped: usize,
}

impl AssetIter<'_> {
    /// Entries skipped so far because they were empty or malformed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for AssetIter<'_> {
    type Item = AssetRecord;

    fn next(&mut self) -> Option<Self::Item> {
        for (key, value) in self.scan.by_ref() {
            if value.is_empty() {
                self.skipped += 1;
                debug!(key = %key, "skipping empty ledger value");
                continue;
            }
            match decode_at(&key, &value) {
                Ok(record) => return Some(record),
                Err(e) => {
                    self.skipped += 1;
                    warn!(key = %key, error = %e, "skipping malformed asset record");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset::tests::sample_fields;
    use crate::core::ledger::MemoryLedger;
    use rust_decimal::Decimal;

    fn registry() -> AssetRegistry {
        AssetRegistry::new(IdScheme::InventoryNumber)
    }

    #[test]
    fn test_create_and_read() {
        let ledger = MemoryLedger::new();
        let created = registry().create(&ledger, Some("A1"), sample_fields(), "S1").unwrap();
        assert_eq!(registry().read(&ledger, "A1").unwrap(), created);
        assert!(registry().exists(&ledger, "A1"));
        assert!(!registry().exists(&ledger, "A2"));
    }

    #[test]
    fn test_create_duplicate_keeps_first() {
        let ledger = MemoryLedger::new();
        let first = registry().create(&ledger, Some("A1"), sample_fields(), "S1").unwrap();
        let mut other = sample_fields();
        other.owner_name = "Someone Else".to_string();
        assert_eq!(
            registry().create(&ledger, Some("A1"), other, "S9"),
            Err(PpeError::AlreadyExists { id: "A1".to_string() })
        );
        assert_eq!(registry().read(&ledger, "A1").unwrap(), first);
    }

    #[test]
    fn test_create_requires_id_under_inventory_scheme() {
        let ledger = MemoryLedger::new();
        assert!(matches!(
            registry().create(&ledger, None, sample_fields(), "S1"),
            Err(PpeError::Validation(_))
        ));
        assert!(matches!(
            registry().create(&ledger, Some("  "), sample_fields(), "S1"),
            Err(PpeError::Validation(_))
        ));
    }

    #[test]
    fn test_generated_scheme() {
        let ledger = MemoryLedger::new();
        let registry = AssetRegistry::new(IdScheme::Generated);
        let a = registry.create(&ledger, None, sample_fields(), "S1").unwrap();
        let b = registry.create(&ledger, None, sample_fields(), "S1").unwrap();
        assert!(a.id().starts_with(GENERATED_ID_PREFIX));
        assert_eq!(a.id().len(), GENERATED_ID_PREFIX.len() + 32);
        assert_ne!(a.id(), b.id());
        assert!(matches!(
            registry.create(&ledger, Some("INV-1"), sample_fields(), "S1"),
            Err(PpeError::Validation(_))
        ));
    }

    #[test]
    fn test_create_rejects_invalid_fields_without_writing() {
        let ledger = MemoryLedger::new();
        let mut f = sample_fields();
        f.unit_price = Decimal::new(-5, 0);
        assert!(matches!(
            registry().create(&ledger, Some("A1"), f, "S1"),
            Err(PpeError::Validation(_))
        ));
        assert!(matches!(
            registry().create(&ledger, Some("A1"), sample_fields(), ""),
            Err(PpeError::Validation(_))
        ));
        assert_eq!(ledger.write_count().unwrap(), 0);
    }

    #[test]
    fn test_update_replaces_fields_only() {
        let ledger = MemoryLedger::new();
        registry().create(&ledger, Some("A1"), sample_fields(), "S1").unwrap();
        let mut f = sample_fields();
        f.owner_name = "Petrov Petr".to_string();
        f.lifetime_months = 36;
        let updated = registry().update(&ledger, "A1", f.clone().into()).unwrap();
        assert_eq!(updated.id(), "A1");
        assert_eq!(updated.fields(), &f);
        assert_eq!(updated.status(), AssetStatus::InService);
        assert_eq!(updated.current_subsidiary(), "S1");
        assert_eq!(registry().read(&ledger, "A1").unwrap(), updated);
    }

    #[test]
    fn test_update_with_overrides() {
        let ledger = MemoryLedger::new();
        registry().create(&ledger, Some("A1"), sample_fields(), "S1").unwrap();
        let updated = registry()
            .update(
                &ledger,
                "A1",
                AssetUpdate {
                    fields: sample_fields(),
                    status: Some(AssetStatus::Retired),
                    current_subsidiary: Some("S3".to_string()),
                },
            )
            .unwrap();
        assert_eq!(updated.status(), AssetStatus::Retired);
        assert_eq!(updated.current_subsidiary(), "S3");
        assert!(updated.previous_subsidiary().is_none());

        // retired assets are frozen
        assert!(matches!(
            registry().update(&ledger, "A1", sample_fields().into()),
            Err(PpeError::InvalidTransition { from: AssetStatus::Retired, .. })
        ));
    }

    #[test]
    fn test_update_cannot_enter_pending_transfer() {
        let ledger = MemoryLedger::new();
        registry().create(&ledger, Some("A1"), sample_fields(), "S1").unwrap();
        let update = AssetUpdate {
            status: Some(AssetStatus::PendingTransfer),
            ..AssetUpdate::fields(sample_fields())
        };
        assert!(matches!(
            registry().update(&ledger, "A1", update),
            Err(PpeError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_delete_then_not_found() {
        let ledger = MemoryLedger::new();
        registry().create(&ledger, Some("A1"), sample_fields(), "S1").unwrap();
        registry().delete(&ledger, "A1").unwrap();
        assert_eq!(
            registry().read(&ledger, "A1"),
            Err(PpeError::NotFound { id: "A1".to_string() })
        );
        assert!(!registry().exists(&ledger, "A1"));
        assert_eq!(
            registry().delete(&ledger, "A1"),
            Err(PpeError::NotFound { id: "A1".to_string() })
        );
    }

    #[test]
    fn test_empty_value_counts_as_absent() {
        let ledger = MemoryLedger::new();
        ledger.put_raw("A1", b"").unwrap();
        assert!(!registry().exists(&ledger, "A1"));
        assert!(matches!(registry().read(&ledger, "A1"), Err(PpeError::NotFound { .. })));
        assert!(registry().create(&ledger, Some("A1"), sample_fields(), "S1").is_ok());
    }

    #[test]
    fn test_read_malformed_reports_key() {
        let ledger = MemoryLedger::new();
        ledger.put_raw("A1", b"{\"id\":\"A1\"}").unwrap();
        match registry().read(&ledger, "A1") {
            Err(PpeError::MalformedRecord { id, .. }) => assert_eq!(id.as_deref(), Some("A1")),
            other => panic!("expected malformed record, got {:?}", other),
        }
    }

    #[test]
    fn test_read_rejects_key_mismatch() {
        let ledger = MemoryLedger::new();
        let record = AssetRecord::issue("B7", sample_fields(), "S1").unwrap();
        ledger.put_raw("A1", &codec::encode(&record).unwrap()).unwrap();
        assert!(matches!(registry().read(&ledger, "A1"), Err(PpeError::MalformedRecord { .. })));
    }

    #[test]
    fn test_list_skips_malformed() {
        let ledger = MemoryLedger::new();
        registry().create(&ledger, Some("A1"), sample_fields(), "S1").unwrap();
        ledger.put_raw("A2", b"garbage").unwrap();
        registry().create(&ledger, Some("A3"), sample_fields(), "S1").unwrap();

        let mut iter = registry().list(&ledger).unwrap();
        let ids: Vec<String> = iter.by_ref().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["A1", "A3"]);
        assert_eq!(iter.skipped(), 1);
    }

    #[test]
    fn test_list_skips_record_filed_under_another_key() {
        let ledger = MemoryLedger::new();
        let a1 = registry().create(&ledger, Some("A1"), sample_fields(), "S1").unwrap();
        ledger.put_raw("A2", &codec::encode(&a1).unwrap()).unwrap();

        let mut iter = registry().list(&ledger).unwrap();
        let ids: Vec<String> = iter.by_ref().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["A1"]);
        assert_eq!(iter.skipped(), 1);
        assert!(matches!(
            registry().read(&ledger, "A2"),
            Err(PpeError::MalformedRecord { id: Some(ref key), .. }) if key == "A2"
        ));
    }

    #[test]
    fn test_delete_malformed_live_value() {
        let ledger = MemoryLedger::new();
        ledger.put_raw("A1", b"garbage").unwrap();
        assert!(registry().exists(&ledger, "A1"));

        registry().delete(&ledger, "A1").unwrap();
        assert!(!registry().exists(&ledger, "A1"));
        assert!(matches!(registry().delete(&ledger, "A1"), Err(PpeError::NotFound { .. })));
        let history = registry().history(&ledger, "A1").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].state.is_tombstone());
    }

    #[test]
    fn test_history_not_found_for_unknown_key() {
        let ledger = MemoryLedger::new();
        assert_eq!(
            registry().history(&ledger, "nope"),
            Err(PpeError::NotFound { id: "nope".to_string() })
        );
    }

    #[test]
    fn test_id_scheme_parse() {
        assert_eq!("inventory".parse::<IdScheme>().unwrap(), IdScheme::InventoryNumber);
        assert_eq!("Generated".parse::<IdScheme>().unwrap(), IdScheme::Generated);
        assert!(matches!("serial".parse::<IdScheme>(), Err(PpeError::Config(_))));
    }
}
