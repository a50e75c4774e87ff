//! Two-phase subsidiary transfer.
//!
//! `transfer` proposes a move: the asset becomes `PendingTransfer` and
//! `current_subsidiary` points at the destination, while the origin is kept in the
//! record's pending-transfer marker. `apply_transfer` confirms receipt: the origin is
//! copied into `previous_subsidiary` and the status becomes the confirmed one.
//!
//! ```text
//! InService --transfer(dest)--> PendingTransfer
//! PendingTransfer --apply_transfer(InService)--> InService
//! PendingTransfer --apply_transfer(Retired)--> Retired
//! ```
//!
//! A proposed transfer cannot be cancelled; it must be applied.

use tracing::info;
use crate::core::asset::{AssetRecord, AssetStatus};
use crate::core::ledger::Ledger;
use crate::core::registry::{invalid, AssetRegistry};
use crate::error::{PpeError, Result};

/// Pure transition rules of the transfer protocol. No ledger access.
pub struct TransferWorkflow;

impl TransferWorkflow {
    /// First phase. Only `InService` assets can be dispatched.
    pub fn propose(record: &AssetRecord, destination: &str, note: &str) -> Result<AssetRecord> {
        let from = record.status();
        if from != AssetStatus::InService {
            return Err(invalid(record.id(), from, "transfer"));
        }
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(PpeError::Validation(format!(
                "destination subsidiary for asset {} must be non-empty",
                record.id()
            )));
        }
        if destination == record.current_subsidiary() {
            return Err(PpeError::Validation(format!(
                "asset {} is already at subsidiary {}",
                record.id(),
                destination
            )));
        }
        Ok(record.proposed_to(destination.to_string(), note.to_string()))
    }

    /// Second phase. Requires a pending transfer; the confirmed status is `InService` or `Retired`.
    pub fn confirm(record: &AssetRecord, confirmed: AssetStatus) -> Result<AssetRecord> {
        let from = record.status();
        if from != AssetStatus::PendingTransfer || record.pending_transfer().is_none() {
            return Err(invalid(record.id(), from, "apply a transfer that was not proposed"));
        }
        if confirmed == AssetStatus::PendingTransfer {
            return Err(invalid(record.id(), from, "confirm a transfer as PendingTransfer"));
        }
        Ok(record.settled_as(confirmed))
    }
}

impl AssetRegistry {
    /// Proposes moving an asset to `destination`. `previous_subsidiary` is left untouched
    /// until the transfer is applied.
    pub fn transfer<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        id: &str,
        destination: &str,
        note: &str,
    ) -> Result<AssetRecord> {
        let current = self.load(ledger, id)?;
        let next = TransferWorkflow::propose(&current, destination, note)?;
        self.store(ledger, &next)?;
        info!(
            id = %id,
            from = %current.current_subsidiary(),
            to = %next.current_subsidiary(),
            note = %note,
            "asset transfer proposed"
        );
        Ok(next)
    }

    /// Confirms a pending transfer, recording the origin as `previous_subsidiary`.
    pub fn apply_transfer<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        id: &str,
        confirmed: AssetStatus,
    ) -> Result<AssetRecord> {
        let current = self.load(ledger, id)?;
        let next = TransferWorkflow::confirm(&current, confirmed)?;
        self.store(ledger, &next)?;
        info!(
            id = %id,
            previous = next.previous_subsidiary().unwrap_or_default(),
            current = %next.current_subsidiary(),
            status = %next.status(),
            "asset transfer applied"
        );
        Ok(next)
    }
}
