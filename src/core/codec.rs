//! Canonical encoding of asset records as ledger values.
//!
//! **Determinism:** the wire struct fixes the field order, prices are always written
//! with two decimal places and dates as `YYYY-MM-DD`. The same logical record always
//! encodes to the same bytes, so fingerprints are stable across writers.
//!
//! Every attribute is listed explicitly in [`RecordWire`]; adding a field to
//! [`AssetRecord`] without adding it here is a compile error in `encode`.

use std::str::FromStr;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::core::asset::{AssetFields, AssetRecord, AssetStatus, PendingTransfer, PRICE_SCALE};
use crate::error::{PpeError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordWire {
    id: String,
    owner_name: String,
    owner_employee_id: String,
    equipment_name: String,
    unit_price: PriceWire,
    status: AssetStatus,
    start_use_date: String,
    /// Signed so that negative values surface as a range error instead of a type error.
    lifetime_months: i64,
    current_subsidiary: String,
    #[serde(default)]
    previous_subsidiary: Option<String>,
    #[serde(default)]
    pending_transfer: Option<PendingTransferWire>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingTransferWire {
    origin_subsidiary: String,
    #[serde(default)]
    note: String,
}

/// Prices are written as strings; numbers are accepted on read for older writers.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PriceWire {
    Text(String),
    Number(serde_json::Number),
}

impl PriceWire {
    fn parse(&self) -> Result<Decimal> {
        let text = match self {
            PriceWire::Text(s) => s.clone(),
            PriceWire::Number(n) => n.to_string(),
        };
        Decimal::from_str(text.trim())
            .or_else(|_| Decimal::from_scientific(text.trim()))
            .map_err(|e| PpeError::malformed(format!("unitPrice '{}' is not a decimal: {}", text, e)))
    }
}

/// Encodes a record into its canonical JSON bytes.
pub fn encode(record: &AssetRecord) -> Result<Vec<u8>> {
    let AssetFields {
        owner_name,
        owner_employee_id,
        equipment_name,
        unit_price,
        start_use_date,
        lifetime_months,
    } = record.fields();

    let wire = RecordWire {
        id: record.id().to_string(),
        owner_name: owner_name.clone(),
        owner_employee_id: owner_employee_id.clone(),
        equipment_name: equipment_name.clone(),
        unit_price: PriceWire::Text(format!("{:.*}", PRICE_SCALE as usize, unit_price)),
        status: record.status(),
        start_use_date: start_use_date.format(DATE_FORMAT).to_string(),
        lifetime_months: i64::from(*lifetime_months),
        current_subsidiary: record.current_subsidiary().to_string(),
        previous_subsidiary: record.previous_subsidiary().map(str::to_string),
        pending_transfer: record.pending_transfer().map(|p| PendingTransferWire {
            origin_subsidiary: p.origin_subsidiary.clone(),
            note: p.note.clone(),
        }),
    };

    serde_json::to_vec(&wire)
        .map_err(|e| PpeError::Validation(format!("Failed to serialize asset {}: {}", record.id(), e)))
}

/// Decodes and validates a ledger value. Any missing or out-of-range field yields `MalformedRecord`.
pub fn decode(bytes: &[u8]) -> Result<AssetRecord> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(PpeError::malformed("empty value"));
    }
    let wire: RecordWire = serde_json::from_slice(bytes)?;
    let id = wire.id;

    let in_record = |e: PpeError| e.with_id(&id);

    let unit_price = wire.unit_price.parse().map_err(in_record)?;
    let start_use_date = NaiveDate::parse_from_str(wire.start_use_date.trim(), DATE_FORMAT)
        .map_err(|e| {
            in_record(PpeError::malformed(format!(
                "startUseDate '{}' is not an ISO-8601 date: {}",
                wire.start_use_date, e
            )))
        })?;
    let lifetime_months = u32::try_from(wire.lifetime_months)
        .ok()
        .filter(|m| *m > 0)
        .ok_or_else(|| {
            in_record(PpeError::malformed(format!(
                "lifetimeMonths must be > 0, got {}",
                wire.lifetime_months
            )))
        })?;

    let fields = AssetFields {
        owner_name: wire.owner_name,
        owner_employee_id: wire.owner_employee_id,
        equipment_name: wire.equipment_name,
        unit_price,
        start_use_date,
        lifetime_months,
    };

    // An empty previous subsidiary is the same as none.
    let previous_subsidiary = wire.previous_subsidiary.filter(|s| !s.is_empty());
    let pending_transfer = wire.pending_transfer.map(|p| PendingTransfer {
        origin_subsidiary: p.origin_subsidiary,
        note: p.note,
    });

    AssetRecord::from_parts(
        id,
        fields,
        wire.status,
        wire.current_subsidiary,
        previous_subsidiary,
        pending_transfer,
    )
}

/// SHA-256 over the canonical encoding, hex encoded.
pub fn fingerprint(record: &AssetRecord) -> Result<String> {
    let bytes = encode(record)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset::tests::sample_fields;

    fn sample() -> AssetRecord {
        AssetRecord::issue("INV-001", sample_fields(), "North Plant").unwrap()
    }

    #[test]
    fn test_round_trip_issued() {
        let r = sample();
        let decoded = decode(&encode(&r).unwrap()).unwrap();
        assert_eq!(decoded, r);
    }

    #[test]
    fn test_round_trip_pending_and_settled() {
        let pending = sample().proposed_to("South Plant".to_string(), "crew rotation".to_string());
        assert_eq!(decode(&encode(&pending).unwrap()).unwrap(), pending);

        let settled = pending.settled_as(AssetStatus::Retired);
        assert_eq!(decode(&encode(&settled).unwrap()).unwrap(), settled);
    }

    #[test]
    fn test_encoding_is_canonical() {
        let r = sample();
        let json = String::from_utf8(encode(&r).unwrap()).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"id":"INV-001","ownerName":"Ivanov Ivan","ownerEmployeeId":"E-1001","#,
                r#""equipmentName":"Safety helmet","unitPrice":"12.50","status":"InService","#,
                r#""startUseDate":"2024-01-31","lifetimeMonths":24,"currentSubsidiary":"North Plant","#,
                r#""previousSubsidiary":null,"pendingTransfer":null}"#
            )
        );
    }

    #[test]
    fn test_equal_records_encode_identically() {
        let mut f = sample_fields();
        f.unit_price = Decimal::new(125, 1);
        let a = AssetRecord::issue("INV-001", f, "North Plant").unwrap();
        let b = sample();
        assert_eq!(a, b);
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_decode_ignores_whitespace() {
        let pretty = serde_json::to_vec_pretty(
            &serde_json::from_slice::<serde_json::Value>(&encode(&sample()).unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(decode(&pretty).unwrap(), sample());
    }

    #[test]
    fn test_decode_accepts_numeric_price() {
        let json = br#"{"id":"A","ownerName":"o","ownerEmployeeId":"e","equipmentName":"n",
            "unitPrice":99.9,"status":"InService","startUseDate":"2023-05-01",
            "lifetimeMonths":6,"currentSubsidiary":"S1"}"#;
        let r = decode(json).unwrap();
        assert_eq!(r.unit_price(), Decimal::new(999, 1));
        assert!(r.previous_subsidiary().is_none());
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let json = br#"{"id":"A","ownerName":"o","ownerEmployeeId":"e","equipmentName":"n",
            "unitPrice":"1.00","status":"InService","lifetimeMonths":6,"currentSubsidiary":"S1"}"#;
        assert!(matches!(decode(json), Err(PpeError::MalformedRecord { .. })));
    }

    #[test]
    fn test_decode_rejects_out_of_range_values() {
        let negative_price = br#"{"id":"A","ownerName":"o","ownerEmployeeId":"e","equipmentName":"n",
            "unitPrice":"-1.00","status":"InService","startUseDate":"2023-05-01",
            "lifetimeMonths":6,"currentSubsidiary":"S1"}"#;
        assert!(matches!(
            decode(negative_price),
            Err(PpeError::MalformedRecord { id: Some(ref id), .. }) if id == "A"
        ));

        let zero_lifetime = br#"{"id":"A","ownerName":"o","ownerEmployeeId":"e","equipmentName":"n",
            "unitPrice":"1.00","status":"InService","startUseDate":"2023-05-01",
            "lifetimeMonths":0,"currentSubsidiary":"S1"}"#;
        assert!(matches!(decode(zero_lifetime), Err(PpeError::MalformedRecord { .. })));

        let empty_subsidiary = br#"{"id":"A","ownerName":"o","ownerEmployeeId":"e","equipmentName":"n",
            "unitPrice":"1.00","status":"InService","startUseDate":"2023-05-01",
            "lifetimeMonths":6,"currentSubsidiary":""}"#;
        assert!(matches!(decode(empty_subsidiary), Err(PpeError::MalformedRecord { .. })));

        let bad_date = br#"{"id":"A","ownerName":"o","ownerEmployeeId":"e","equipmentName":"n",
            "unitPrice":"1.00","status":"InService","startUseDate":"01.05.2023",
            "lifetimeMonths":6,"currentSubsidiary":"S1"}"#;
        assert!(matches!(decode(bad_date), Err(PpeError::MalformedRecord { .. })));
    }

    #[test]
    fn test_decode_rejects_pending_without_transfer() {
        let json = br#"{"id":"A","ownerName":"o","ownerEmployeeId":"e","equipmentName":"n",
            "unitPrice":"1.00","status":"PendingTransfer","startUseDate":"2023-05-01",
            "lifetimeMonths":6,"currentSubsidiary":"S2"}"#;
        assert!(matches!(decode(json), Err(PpeError::MalformedRecord { .. })));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"").is_err());
        assert!(decode(b"not json").is_err());
        assert!(decode(b"[1,2,3]").is_err());
    }
}
