pub mod error;
pub mod config;
pub mod telemetry;
pub mod core;

pub use error::{PpeError, Result};
pub use config::Settings;

// Core API exports
pub use core::asset::{AssetFields, AssetRecord, AssetStatus, PendingTransfer, PRICE_SCALE};
pub use core::codec::{decode, encode, fingerprint};
pub use core::ledger::{
    Ledger,
    LedgerEntry,
    LedgerError,
    LedgerResult,
    LedgerSession,
    MemoryLedger,
    RangeScan,
    VersionRef,
};
pub use core::journal::JournalLedger;
pub use core::registry::{AssetIter, AssetRegistry, AssetUpdate, IdScheme, GENERATED_ID_PREFIX};
pub use core::transfer::TransferWorkflow;
pub use core::history::{lineages, HistoryEntry, Version};
