use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use evl_store::{FileStore, InMemoryStore, LedgerIndex, LedgerStore, StoreError};
use evl_types::{Digest, Event, EventInput};

use crate::audit::{self, AuditReport, AuditScope};
use crate::backup::Backup;
use crate::commit::{self, CommitPolicy};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::license::{LicenseState, Licensed};
use crate::observe::{self, ObserveOptions, Observation};
use crate::precondition::Precondition;
use crate::query::{self, StreamOptions};
use crate::redaction;
use crate::schema::{NoSchemas, SchemaValidator};

/// Summary counters for a ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub event_count: u64,
    pub subject_count: u64,
    pub type_count: u64,
    /// 0 for an empty ledger.
    pub last_event_id: u64,
    /// Hash of the newest event, or the zero digest for an empty ledger.
    pub last_event_hash: Digest,
}

struct LedgerInner {
    store: RwLock<Box<dyn LedgerStore>>,
    config: LedgerConfig,
    license: Arc<dyn LicenseState>,
    schemas: Arc<dyn SchemaValidator>,
    /// The store follows a log written by another process.
    follower: bool,
}

/// Handle to one authoritative event ledger.
///
/// Cheap to clone; clones share state. Mutations (commit, erase, restore)
/// are serialized behind a single writer lock that covers validation,
/// precondition evaluation, and the append. Readers take the shared lock
/// only long enough to copy out what they return.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

/// Assembles a [`Ledger`] from a store and its collaborators.
pub struct LedgerBuilder {
    config: LedgerConfig,
    license: Arc<dyn LicenseState>,
    schemas: Arc<dyn SchemaValidator>,
}

impl Default for LedgerBuilder {
    fn default() -> Self {
        Self {
            config: LedgerConfig::default(),
            license: Arc::new(Licensed),
            schemas: Arc::new(NoSchemas),
        }
    }
}

impl LedgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn license(mut self, license: impl LicenseState + 'static) -> Self {
        self.license = Arc::new(license);
        self
    }

    pub fn schemas(mut self, schemas: impl SchemaValidator + 'static) -> Self {
        self.schemas = Arc::new(schemas);
        self
    }

    /// Build over an existing store.
    pub fn build(self, store: impl LedgerStore + 'static) -> LedgerResult<Ledger> {
        self.assemble(Box::new(store), false)
    }

    /// Build over a volatile store.
    pub fn in_memory(self) -> LedgerResult<Ledger> {
        self.build(InMemoryStore::new())
    }

    /// Build over a durable store in `dir`, recovering existing data. The
    /// ledger owns `dir` until it is dropped.
    pub fn open(self, dir: &Path) -> LedgerResult<Ledger> {
        self.config.validate()?;
        let store = FileStore::open(dir, self.config.wal.clone())?;
        self.build(store)
    }

    /// Build a read-only view of the durable ledger in `dir`, kept current
    /// with the process that owns it. Mutations fail.
    pub fn open_read_only(self, dir: &Path) -> LedgerResult<Ledger> {
        let store = FileStore::open_read_only(dir)?;
        self.assemble(Box::new(store), true)
    }

    fn assemble(self, store: Box<dyn LedgerStore>, follower: bool) -> LedgerResult<Ledger> {
        self.config.validate()?;
        Ok(Ledger {
            inner: Arc::new(LedgerInner {
                store: RwLock::new(store),
                config: self.config,
                license: self.license,
                schemas: self.schemas,
                follower,
            }),
        })
    }
}

impl Ledger {
    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::new()
    }

    /// A licensed, schema-free, volatile ledger with default settings.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                store: RwLock::new(Box::new(InMemoryStore::new())),
                config: LedgerConfig::default(),
                license: Arc::new(Licensed),
                schemas: Arc::new(NoSchemas),
                follower: false,
            }),
        }
    }

    /// A licensed, schema-free, durable ledger in `dir`.
    pub fn open(dir: &Path, config: LedgerConfig) -> LedgerResult<Self> {
        LedgerBuilder::new().config(config).open(dir)
    }

    /// A read-only view of the durable ledger in `dir`; see
    /// [`LedgerBuilder::open_read_only`].
    pub fn open_read_only(dir: &Path, config: LedgerConfig) -> LedgerResult<Self> {
        LedgerBuilder::new().config(config).open_read_only(dir)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    /// Validate and append a batch atomically.
    ///
    /// Either every input becomes an event, with contiguous ids and a
    /// continuous hash chain, or nothing is written.
    pub fn commit(
        &self,
        inputs: &[EventInput],
        preconditions: &[Precondition],
    ) -> LedgerResult<Vec<Event>> {
        let mut store = self.write()?;
        let policy = CommitPolicy {
            config: &self.inner.config,
            license: self.inner.license.as_ref(),
            schemas: self.inner.schemas.as_ref(),
        };
        let records = match commit::prepare_batch(store.index(), &policy, inputs, preconditions, Utc::now()) {
            Ok(records) => records,
            Err(e) => {
                debug!(events = inputs.len(), error = %e, "commit rejected");
                return Err(e);
            }
        };
        let events: Vec<Event> = records.iter().map(|r| r.event.clone()).collect();
        store.append(records)?;
        drop(store);

        if let (Some(first), Some(last)) = (events.first(), events.last()) {
            info!(count = events.len(), first_id = first.id, last_id = last.id, "events committed");
        }
        Ok(events)
    }

    /// Events of `subject` selected by `options`, ascending by id.
    pub fn stream(&self, subject: &str, options: &StreamOptions) -> LedgerResult<Vec<Event>> {
        query::stream(self.read()?.index(), subject, options)
    }

    pub fn event(&self, id: u64) -> LedgerResult<Event> {
        self.read()?
            .index()
            .get(id)
            .map(|record| record.event.clone())
            .ok_or_else(|| LedgerError::NotFound(format!("event {id}")))
    }

    pub fn status(&self) -> LedgerResult<LedgerStatus> {
        let store = self.read()?;
        let index = store.index();
        Ok(LedgerStatus {
            event_count: index.len() as u64,
            subject_count: index.subject_count() as u64,
            type_count: index.type_count() as u64,
            last_event_id: index.last_id(),
            last_event_hash: index.tail().map(|t| t.event.hash).unwrap_or_default(),
        })
    }

    /// Subjects with at least one event, sorted; limited to `base` and its
    /// descendants when given.
    pub fn subjects(&self, base: Option<&str>) -> LedgerResult<Vec<String>> {
        let store = self.read()?;
        let index = store.index();
        match base {
            Some(base) => {
                evl_types::validate_subject(base)?;
                Ok(index.subjects_within(base).map(String::from).collect())
            }
            None => Ok(index.subjects().map(String::from).collect()),
        }
    }

    /// Distinct event types, sorted.
    pub fn event_types(&self) -> LedgerResult<Vec<String>> {
        Ok(self.read()?.index().event_types().map(String::from).collect())
    }

    /// Subscribe to new events of `subject`. Must be called within a tokio
    /// runtime; the polling task runs there.
    pub fn observe(&self, subject: &str, options: ObserveOptions) -> LedgerResult<Observation> {
        observe::spawn(self.clone(), subject, options)
    }

    /// Verify the hash chain. A break is reported in the result, not as an
    /// error.
    ///
    /// Records are copied out under the read lock and hashed after it is
    /// released, so commits are not held up by the audit.
    pub fn audit(&self, scope: &AuditScope) -> LedgerResult<AuditReport> {
        let report = match scope {
            AuditScope::All => {
                let records = self.read()?.index().records().to_vec();
                audit::audit_records(&records)
            }
            AuditScope::Subject(subject) => {
                let slice = audit::SubjectSlice::capture(self.read()?.index(), subject)?;
                audit::audit_subject(&slice)
            }
        };

        match &report.first_break {
            Some(br) => warn!(id = br.id, kind = ?br.kind, reason = %br.reason, "audit found a chain break"),
            None => debug!(events = report.events_checked, "audit passed"),
        }
        Ok(report)
    }

    /// Erase the payloads of every event on `subject`. Returns how many
    /// events were newly erased.
    pub fn erase(&self, subject: &str) -> LedgerResult<u64> {
        let mut store = self.write()?;
        redaction::erase_subject(&mut **store, subject)
    }

    /// Export the whole ledger in commit order.
    pub fn create_backup(&self) -> LedgerResult<Backup> {
        let records = self.read()?.index().records().to_vec();
        Ok(Backup::new(records))
    }

    /// Load a backup into this ledger, which must be empty.
    ///
    /// The backup is audited in full first; any break rejects it with
    /// `IntegrityViolation` and leaves the ledger unchanged.
    pub fn restore_backup(&self, backup: Backup) -> LedgerResult<u64> {
        let records = backup.into_records();
        let report = audit::audit_records(&records);
        if let Some(br) = report.first_break {
            warn!(id = br.id, kind = ?br.kind, "backup rejected");
            return Err(LedgerError::IntegrityViolation {
                id: br.id,
                reason: br.reason,
            });
        }

        let mut store = self.write()?;
        if !store.index().is_empty() {
            return Err(LedgerError::AlreadyExists(format!(
                "ledger already holds {} events",
                store.index().len()
            )));
        }
        let count = records.len() as u64;
        store.replace(records)?;
        info!(count, "backup restored");
        Ok(count)
    }

    /// Pick up events committed by the process that owns the directory.
    /// Returns how many events were added; always 0 unless the ledger was
    /// opened read-only.
    pub fn refresh(&self) -> LedgerResult<u64> {
        if !self.inner.follower {
            return Ok(0);
        }
        let added = self.write()?.refresh()?;
        if added > 0 {
            debug!(added, "ledger refreshed");
        }
        Ok(added)
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.follower
    }

    /// Run `f` against a consistent view of the index.
    pub(crate) fn with_index<R>(&self, f: impl FnOnce(&LedgerIndex) -> R) -> LedgerResult<R> {
        Ok(f(self.read()?.index()))
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Box<dyn LedgerStore>>> {
        self.inner
            .store
            .read()
            .map_err(|_| LedgerError::Store(StoreError::LockPoisoned))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Box<dyn LedgerStore>>> {
        self.inner
            .store
            .write()
            .map_err(|_| LedgerError::Store(StoreError::LockPoisoned))
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
