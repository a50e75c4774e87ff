// Core module for asset lifecycle tracking on a versioned ledger
//
// LAYERING:
// =========
// 1. asset: immutable record values and their invariants
// 2. codec: canonical byte encoding of a record (the ledger value)
// 3. ledger: the storage contract plus the in-memory reference adapter
// 4. journal: file-backed adapter used by the CLI
// 5. registry + transfer: lifecycle operations and the two-phase move
// 6. history: structured audit trail
//
// INVARIANTS:
// - The ledger is the only shared mutable state; nothing in this module caches records
// - Every mutation writes a complete new record under the same key
// - History is never rewritten, only appended to
// - Errors are returned at the point of detection; nothing here retries

pub mod asset;
pub mod codec;
pub mod ledger;
pub mod journal;
pub mod registry;
pub mod transfer;
pub mod history;
