//! Trading configuration shared by every strategy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a trade waits for operator approval by default.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Quote currency of every market and of the cash balance check
    pub quote_currency: String,

    /// Seconds to wait for approval before a trade is dropped
    pub confirmation_timeout_secs: u64,

    /// Directory holding one ledger file per strategy
    pub records_dir: PathBuf,

    /// Directory ledgers of deleted strategies are moved into
    pub backup_dir: PathBuf,
}

impl TradingConfig {
    /// Defaults with ledger directories under `data_dir`.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            records_dir: data_dir.join("records"),
            backup_dir: data_dir.join("records_backup"),
            ..Self::default()
        }
    }

    /// Same settings with ledgers in a `dry_run` subdirectory, so simulated
    /// fills never count towards a live position.
    pub fn for_dry_run(&self) -> Self {
        Self {
            records_dir: self.records_dir.join("dry_run"),
            backup_dir: self.backup_dir.join("dry_run"),
            ..self.clone()
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            quote_currency: "twd".to_string(),
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            records_dir: PathBuf::from("records"),
            backup_dir: PathBuf::from("records_backup"),
        }
    }
}
