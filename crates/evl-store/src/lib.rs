//! Storage backends for the Event Ledger.
//!
//! The store keeps committed events in id order together with the content
//! digest each was committed with, plus secondary indexes by subject and by
//! event type. Two backends implement [`LedgerStore`]:
//!
//! - [`InMemoryStore`]: volatile, for tests and embedding
//! - [`FileStore`]: durable, backed by a CRC-framed [`WriteAheadLog`]; one
//!   writer per directory, any number of read-only followers
//!
//! A commit batch is one WAL entry, so a batch is either fully recovered or
//! not recovered at all.

pub mod error;
pub mod file;
pub mod index;
pub mod memory;
pub mod record;
pub mod traits;
pub mod wal;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use index::LedgerIndex;
pub use memory::InMemoryStore;
pub use record::StoredEvent;
pub use traits::LedgerStore;
pub use file::{LOCK_FILE, WAL_FILE};
pub use wal::{RecoveryReport, SyncMode, TailUpdate, WalConfig, WalEntry, WalTail, WriteAheadLog};
