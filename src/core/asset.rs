//! Asset record model: one immutable version of a tracked PPE item.
//!
//! Records are never mutated in place. Every registry operation derives a new
//! `AssetRecord` from the current one and writes it under the same ledger key.

use std::fmt;
use std::str::FromStr;
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::error::{PpeError, Result};

/// Number of decimal places a unit price is stored with.
pub const PRICE_SCALE: u32 = 2;

/// Lifecycle status of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetStatus {
    /// Issued and in use at `current_subsidiary`.
    InService,
    /// Dispatched to `current_subsidiary`, receipt not yet confirmed.
    PendingTransfer,
    /// Withdrawn from use. Only reachable by confirming a transfer as retired.
    Retired,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::InService => "InService",
            AssetStatus::PendingTransfer => "PendingTransfer",
            AssetStatus::Retired => "Retired",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = PpeError;

    /// Accepts the canonical names as well as kebab/snake case (`in-service`, `pending_transfer`).
    fn from_str(s: &str) -> Result<Self> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "inservice" => Ok(AssetStatus::InService),
            "pendingtransfer" => Ok(AssetStatus::PendingTransfer),
            "retired" => Ok(AssetStatus::Retired),
            _ => Err(PpeError::Validation(format!("unknown asset status '{}'", s))),
        }
    }
}

/// Mutable attributes of an asset, supplied on `create` and replaced wholesale on `update`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetFields {
    pub owner_name: String,
    /// Personnel number of the employee the item is issued to.
    pub owner_employee_id: String,
    pub equipment_name: String,
    pub unit_price: Decimal,
    pub start_use_date: NaiveDate,
    /// Service life in calendar months. Must be positive.
    pub lifetime_months: u32,
}

impl AssetFields {
    /// Checks the attribute invariants, returning the first violated rule.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(PpeError::Validation)
    }

    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        if self.owner_name.trim().is_empty() {
            return Err("ownerName must be non-empty".to_string());
        }
        if self.owner_employee_id.trim().is_empty() {
            return Err("ownerEmployeeId must be non-empty".to_string());
        }
        if self.equipment_name.trim().is_empty() {
            return Err("equipmentName must be non-empty".to_string());
        }
        if self.unit_price < Decimal::ZERO {
            return Err(format!("unitPrice must be >= 0, got {}", self.unit_price));
        }
        if self.unit_price.normalize().scale() > PRICE_SCALE {
            return Err(format!(
                "unitPrice must have at most {} decimal places, got {}",
                PRICE_SCALE, self.unit_price
            ));
        }
        if self.lifetime_months == 0 {
            return Err("lifetimeMonths must be > 0".to_string());
        }
        Ok(())
    }
}

/// An in-flight subsidiary move, present exactly while the asset is `PendingTransfer`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingTransfer {
    /// Subsidiary responsible for the asset before the move was proposed.
    pub origin_subsidiary: String,
    pub note: String,
}

/// One version of an asset as stored in the ledger.
///
/// # Invariants
/// - `id` and `current_subsidiary` are non-empty.
/// - `fields` satisfy [`AssetFields::validate`].
/// - `status == PendingTransfer` iff `pending_transfer.is_some()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetRecord {
    id: String,
    fields: AssetFields,
    status: AssetStatus,
    current_subsidiary: String,
    previous_subsidiary: Option<String>,
    pending_transfer: Option<PendingTransfer>,
}

impl AssetRecord {
    /// Builds a freshly issued record: `InService`, no previous subsidiary.
    pub fn issue(id: impl Into<String>, fields: AssetFields, subsidiary: impl Into<String>) -> Result<Self> {
        let record = Self {
            id: id.into(),
            fields,
            status: AssetStatus::InService,
            current_subsidiary: subsidiary.into(),
            previous_subsidiary: None,
            pending_transfer: None,
        };
        record.check_invariants().map_err(PpeError::Validation)?;
        Ok(record)
    }

    /// Reassembles a record from decoded parts. Fails with `MalformedRecord` on any invariant violation.
    pub(crate) fn from_parts(
        id: String,
        fields: AssetFields,
        status: AssetStatus,
        current_subsidiary: String,
        previous_subsidiary: Option<String>,
        pending_transfer: Option<PendingTransfer>,
    ) -> Result<Self> {
        let record = Self {
            id,
            fields,
            status,
            current_subsidiary,
            previous_subsidiary,
            pending_transfer,
        };
        match record.check_invariants() {
            Ok(()) => Ok(record),
            Err(reason) => Err(PpeError::MalformedRecord {
                id: Some(record.id),
                reason,
            }),
        }
    }

    pub(crate) fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must be non-empty".to_string());
        }
        self.fields.check()?;
        if self.current_subsidiary.trim().is_empty() {
            return Err("currentSubsidiary must be non-empty".to_string());
        }
        match (self.status, &self.pending_transfer) {
            (AssetStatus::PendingTransfer, None) => {
                Err("status PendingTransfer requires pendingTransfer".to_string())
            }
            (status, Some(_)) if status != AssetStatus::PendingTransfer => {
                Err(format!("pendingTransfer present while status is {}", status))
            }
            _ => Ok(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &AssetFields {
        &self.fields
    }

    pub fn owner_name(&self) -> &str {
        &self.fields.owner_name
    }

    pub fn owner_employee_id(&self) -> &str {
        &self.fields.owner_employee_id
    }

    pub fn equipment_name(&self) -> &str {
        &self.fields.equipment_name
    }

    pub fn unit_price(&self) -> Decimal {
        self.fields.unit_price
    }

    pub fn start_use_date(&self) -> NaiveDate {
        self.fields.start_use_date
    }

    pub fn lifetime_months(&self) -> u32 {
        self.fields.lifetime_months
    }

    pub fn status(&self) -> AssetStatus {
        self.status
    }

    /// While `PendingTransfer`, this is the proposed destination.
    pub fn current_subsidiary(&self) -> &str {
        &self.current_subsidiary
    }

    pub fn previous_subsidiary(&self) -> Option<&str> {
        self.previous_subsidiary.as_deref()
    }

    pub fn pending_transfer(&self) -> Option<&PendingTransfer> {
        self.pending_transfer.as_ref()
    }

    /// Date the service life runs out. Month arithmetic clamps to the last day of a shorter month.
    pub fn end_of_life_date(&self) -> Option<NaiveDate> {
        self.fields
            .start_use_date
            .checked_add_months(Months::new(self.fields.lifetime_months))
    }

    /// True when `on` is on or after the end-of-life date.
    pub fn is_expired(&self, on: NaiveDate) -> bool {
        self.end_of_life_date().map(|eol| on >= eol).unwrap_or(false)
    }

    /// Lowercase hex SHA-256 of the canonical encoding.
    pub fn fingerprint(&self) -> Result<String> {
        crate::core::codec::fingerprint(self)
    }

    pub(crate) fn with_fields(&self, fields: AssetFields) -> Self {
        Self {
            fields,
            ..self.clone()
        }
    }

    pub(crate) fn with_status(&self, status: AssetStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub(crate) fn with_current_subsidiary(&self, subsidiary: String) -> Self {
        Self {
            current_subsidiary: subsidiary,
            ..self.clone()
        }
    }

    /// First phase of a move: point `current_subsidiary` at the destination and remember the origin.
    pub(crate) fn proposed_to(&self, destination: String, note: String) -> Self {
        Self {
            status: AssetStatus::PendingTransfer,
            pending_transfer: Some(PendingTransfer {
                origin_subsidiary: self.current_subsidiary.clone(),
                note,
            }),
            current_subsidiary: destination,
            ..self.clone()
        }
    }

    /// Second phase: settle the move. Caller guarantees a transfer is pending.
    pub(crate) fn settled_as(&self, status: AssetStatus) -> Self {
        let origin = self
            .pending_transfer
            .as_ref()
            .map(|p| p.origin_subsidiary.clone());
        Self {
            status,
            previous_subsidiary: origin.or_else(|| self.previous_subsidiary.clone()),
            pending_transfer: None,
            ..self.clone()
        }
    }
}
