use thiserror::Error;
use crate::core::ledger::LedgerError;
use crate::core::asset::AssetStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PpeError {
    #[error("Asset {id} already exists")]
    AlreadyExists { id: String },

    #[error("Asset {id} does not exist")]
    NotFound { id: String },

    #[error("Invalid transition for asset {id}: cannot {action} while {from}")]
    InvalidTransition {
        id: String,
        from: AssetStatus,
        action: &'static str,
    },

    #[error("Malformed record{}: {reason}", key_suffix(.id))]
    MalformedRecord {
        id: Option<String>,
        reason: String,
    },

    #[error("Write conflict on key {key}")]
    WriteConflict { key: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PpeError>;

fn key_suffix(id: &Option<String>) -> String {
    id.as_ref().map(|i| format!(" {}", i)).unwrap_or_default()
}

impl PpeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        PpeError::MalformedRecord {
            id: None,
            reason: reason.into(),
        }
    }

    /// Attaches the ledger key to a decode failure that did not know it.
    pub(crate) fn with_id(self, key: &str) -> Self {
        match self {
            PpeError::MalformedRecord { id: None, reason } => PpeError::MalformedRecord {
                id: Some(key.to_string()),
                reason,
            },
            other => other,
        }
    }
}

impl From<LedgerError> for PpeError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::WriteConflict { key } => PpeError::WriteConflict { key },
            other => PpeError::Ledger(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PpeError {
    fn from(err: serde_json::Error) -> Self {
        PpeError::malformed(err.to_string())
    }
}
