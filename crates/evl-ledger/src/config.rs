use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use evl_store::WalConfig;

use crate::error::{LedgerError, LedgerResult};

/// Configuration for a ledger instance.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// max_event_size = 131072
///
/// [wal]
/// sync_mode = "every_write"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Largest accepted serialized event input, in bytes.
    pub max_event_size: usize,
    /// Total events an unlicensed ledger may hold.
    pub unlicensed_event_cap: u64,
    /// Poll interval for observations that do not set one.
    pub default_observe_interval_ms: u64,
    /// Events buffered per observation before polling waits on the reader.
    pub observe_buffer: usize,
    /// Write-ahead log settings for durable ledgers.
    pub wal: WalConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_event_size: 64 * 1024,
            unlicensed_event_cap: 25_000,
            default_observe_interval_ms: 1_000,
            observe_buffer: 256,
            wal: WalConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> LedgerResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.max_event_size == 0 {
            return Err(LedgerError::Config("max_event_size must be positive".into()));
        }
        if self.default_observe_interval_ms == 0 {
            return Err(LedgerError::Config(
                "default_observe_interval_ms must be positive".into(),
            ));
        }
        if self.observe_buffer == 0 {
            return Err(LedgerError::Config("observe_buffer must be positive".into()));
        }
        Ok(())
    }

    pub fn default_observe_interval(&self) -> Duration {
        Duration::from_millis(self.default_observe_interval_ms)
    }
}
