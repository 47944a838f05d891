use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::index::LedgerIndex;
use crate::record::StoredEvent;
use crate::traits::LedgerStore;
use crate::wal::{RecoveryReport, TailUpdate, WalConfig, WalEntry, WalTail, WriteAheadLog};

/// File name of the log inside the data directory.
pub const WAL_FILE: &str = "ledger.wal";

/// Lock file held by the writer for as long as the store is open.
pub const LOCK_FILE: &str = "LOCK";

/// Records per WAL entry when the log is rewritten.
const REWRITE_CHUNK: usize = 1024;

enum Access {
    /// Sole writer; `_lock` holds the directory lock.
    Writer { wal: WriteAheadLog, _lock: File },
    /// Follows the log of a writer elsewhere.
    Follower { tail: WalTail },
}

/// Durable store: a write-ahead log on disk plus the in-memory index
/// rebuilt from it on open.
///
/// Commits append one WAL entry per batch. Erasure and restore rewrite the
/// whole log so that erased payloads do not survive on disk.
///
/// A directory has at most one writer, enforced with an exclusive lock on
/// [`LOCK_FILE`]. Read-only followers take no lock and pick up the writer's
/// commits on [`refresh`](LedgerStore::refresh).
pub struct FileStore {
    path: PathBuf,
    access: Access,
    index: LedgerIndex,
    recovery: RecoveryReport,
}

impl FileStore {
    /// Open (or create) the store in `dir` as its writer, recovering any
    /// existing log. Fails with [`StoreError::Locked`] while another writer
    /// holds the directory.
    pub fn open(dir: &Path, config: WalConfig) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let lock = lock_dir(dir)?;
        let wal = WriteAheadLog::open(&dir.join(WAL_FILE), config)?;
        let (entries, recovery) = wal.recover()?;
        let index = index_from(entries)?;

        info!(
            path = %wal.path().display(),
            events = index.len(),
            discarded_bytes = recovery.discarded_bytes,
            "ledger store opened"
        );
        Ok(Self {
            path: wal.path().to_path_buf(),
            access: Access::Writer { wal, _lock: lock },
            index,
            recovery,
        })
    }

    /// Open the store in `dir` as a read-only follower. A missing directory
    /// or log reads as an empty ledger.
    pub fn open_read_only(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(WAL_FILE);
        let (tail, entries) = WalTail::open(&path)?;
        let recovery = RecoveryReport {
            entries: entries.len(),
            valid_bytes: tail.offset(),
            discarded_bytes: 0,
        };
        let index = index_from(entries)?;

        info!(path = %path.display(), events = index.len(), "ledger store opened read-only");
        Ok(Self {
            path,
            access: Access::Follower { tail },
            index,
            recovery,
        })
    }

    /// What recovery found when the store was opened.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.access, Access::Follower { .. })
    }

    fn wal(&self) -> StoreResult<&WriteAheadLog> {
        match &self.access {
            Access::Writer { wal, .. } => Ok(wal),
            Access::Follower { .. } => Err(StoreError::ReadOnly),
        }
    }

    fn rewrite(&self, index: &LedgerIndex) -> StoreResult<()> {
        let entries: Vec<WalEntry> = index
            .records()
            .chunks(REWRITE_CHUNK)
            .map(|chunk| WalEntry {
                events: chunk.to_vec(),
            })
            .collect();
        self.wal()?.rewrite(&entries)
    }

    fn reload(&mut self, entries: Vec<WalEntry>) -> StoreResult<u64> {
        let before = self.index.last_id();
        self.index = index_from(entries)?;
        debug!(events = self.index.len(), "followed log reloaded");
        Ok(self.index.last_id().saturating_sub(before))
    }
}

impl LedgerStore for FileStore {
    fn index(&self) -> &LedgerIndex {
        &self.index
    }

    fn append(&mut self, records: Vec<StoredEvent>) -> StoreResult<()> {
        let wal = self.wal()?;
        self.index.check_continues(&records)?;
        let entry = WalEntry { events: records };
        wal.append(&entry)?;
        self.index.extend(entry.events)
    }

    fn redact(&mut self, ids: &[u64]) -> StoreResult<u64> {
        self.wal()?;
        let mut next = self.index.clone();
        let changed = next.redact(ids)?;
        if changed > 0 {
            self.rewrite(&next)?;
            self.index = next;
        }
        Ok(changed)
    }

    fn replace(&mut self, records: Vec<StoredEvent>) -> StoreResult<()> {
        self.wal()?;
        let next = LedgerIndex::from_records(records)?;
        self.rewrite(&next)?;
        self.index = next;
        Ok(())
    }

    fn refresh(&mut self) -> StoreResult<u64> {
        let Access::Follower { tail } = &mut self.access else {
            return Ok(0);
        };
        let entries = match tail.poll()? {
            TailUpdate::Appended(entries) => entries,
            TailUpdate::Reloaded(entries) => return self.reload(entries),
        };
        let records: Vec<StoredEvent> = entries.into_iter().flat_map(|e| e.events).collect();
        if records.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.index.check_continues(&records) {
            warn!(error = %e, "followed log no longer continues; reloading");
            tail.reset();
            let entries = match tail.poll()? {
                TailUpdate::Appended(entries) | TailUpdate::Reloaded(entries) => entries,
            };
            return self.reload(entries);
        }
        let added = records.len() as u64;
        self.index.extend(records)?;
        Ok(added)
    }
}

fn lock_dir(dir: &Path) -> StoreResult<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(dir.join(LOCK_FILE))?;
    fs2::FileExt::try_lock_exclusive(&file).map_err(|_| StoreError::Locked(dir.to_path_buf()))?;
    Ok(file)
}

fn index_from(entries: Vec<WalEntry>) -> StoreResult<LedgerIndex> {
    let records: Vec<StoredEvent> = entries.into_iter().flat_map(|e| e.events).collect();
    LedgerIndex::from_records(records)
        .map_err(|e| StoreError::Corrupt(format!("recovered log is not contiguous: {e}")))
}
