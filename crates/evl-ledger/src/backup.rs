use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evl_store::StoredEvent;
use evl_types::{Digest, Event};

use crate::error::{LedgerError, LedgerResult};

/// Current backup layout version.
pub const BACKUP_VERSION: u32 = 1;

/// zstd frame magic, little-endian on disk.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

const ZSTD_LEVEL: i32 = 3;

/// One event as exported, with the digest needed to verify it after erasure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub event: Event,
    pub content_digest: Digest,
    #[serde(default)]
    pub redacted: bool,
}

impl From<StoredEvent> for BackupRecord {
    fn from(stored: StoredEvent) -> Self {
        Self {
            event: stored.event,
            content_digest: stored.content_digest,
            redacted: stored.redacted,
        }
    }
}

impl From<BackupRecord> for StoredEvent {
    fn from(record: BackupRecord) -> Self {
        Self {
            event: record.event,
            content_digest: record.content_digest,
            redacted: record.redacted,
        }
    }
}

/// Encoding of a serialized backup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupFormat {
    #[default]
    Json,
    /// JSON compressed with zstd.
    JsonZstd,
}

/// The full ledger in commit order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub events: Vec<BackupRecord>,
}

impl Backup {
    pub(crate) fn new(records: Vec<StoredEvent>) -> Self {
        Self {
            version: BACKUP_VERSION,
            created_at: Utc::now(),
            events: records.into_iter().map(BackupRecord::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn encode(&self, format: BackupFormat) -> LedgerResult<Vec<u8>> {
        let json = serde_json::to_vec(self).map_err(|e| LedgerError::Codec(e.to_string()))?;
        match format {
            BackupFormat::Json => Ok(json),
            BackupFormat::JsonZstd => zstd::encode_all(json.as_slice(), ZSTD_LEVEL)
                .map_err(|e| LedgerError::Codec(format!("zstd compression failed: {e}"))),
        }
    }

    /// Decode either format; compressed input is recognised by its magic.
    pub fn decode(bytes: &[u8]) -> LedgerResult<Self> {
        let json = if bytes.starts_with(&ZSTD_MAGIC) {
            zstd::decode_all(bytes).map_err(|e| {
                LedgerError::InvalidArgument(format!("backup is not valid zstd: {e}"))
            })?
        } else {
            bytes.to_vec()
        };
        let backup: Self = serde_json::from_slice(&json)
            .map_err(|e| LedgerError::InvalidArgument(format!("malformed backup: {e}")))?;
        if backup.version != BACKUP_VERSION {
            return Err(LedgerError::InvalidArgument(format!(
                "unsupported backup version {} (expected {BACKUP_VERSION})",
                backup.version
            )));
        }
        Ok(backup)
    }

    pub(crate) fn into_records(self) -> Vec<StoredEvent> {
        self.events.into_iter().map(StoredEvent::from).collect()
    }
}
