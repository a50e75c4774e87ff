//! Runtime settings, read from the environment (and an optional `.env` file).
//!
//! | variable          | default              |
//! |-------------------|----------------------|
//! | `PPE_LEDGER_PATH` | `ppe-ledger.jsonl`   |
//! | `PPE_ID_SCHEME`   | `inventory`          |
//! | `PPE_LOG`         | `ppe_ledger=info`    |
//!
//! Command-line flags take precedence over these values.

use std::path::PathBuf;
use crate::core::registry::IdScheme;
use crate::error::{PpeError, Result};

pub const ENV_LEDGER_PATH: &str = "PPE_LEDGER_PATH";
pub const ENV_ID_SCHEME: &str = "PPE_ID_SCHEME";
pub const ENV_LOG: &str = "PPE_LOG";

pub const DEFAULT_LEDGER_PATH: &str = "ppe-ledger.jsonl";
pub const DEFAULT_LOG_FILTER: &str = "ppe_ledger=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub ledger_path: PathBuf,
    pub id_scheme: IdScheme,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            id_scheme: IdScheme::InventoryNumber,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(PpeError::Config(format!("cannot load .env: {}", e)));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable source. Blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(path) = get(ENV_LEDGER_PATH) {
            settings.ledger_path = PathBuf::from(path);
        }
        if let Some(scheme) = get(ENV_ID_SCHEME) {
            settings.id_scheme = scheme
                .parse()
                .map_err(|e: PpeError| PpeError::Config(format!("{}: {}", ENV_ID_SCHEME, e)))?;
        }
        if let Some(filter) = get(ENV_LOG) {
            settings.log_filter = filter;
        }
        Ok(settings)
    }
}
