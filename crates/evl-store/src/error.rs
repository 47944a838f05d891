use std::io;
use std::path::PathBuf;

/// Errors produced by ledger storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error during WAL or file operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Appended records do not continue the current id sequence.
    #[error("out of order append: expected event {expected}, found {found}")]
    OutOfOrder { expected: u64, found: u64 },

    /// A redaction named an event the store does not hold.
    #[error("event {0} not found")]
    UnknownEvent(u64),

    /// Recovered data is structurally unusable.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// Another handle owns the data directory.
    #[error("ledger directory {} is in use by another process", .0.display())]
    Locked(PathBuf),

    /// The store follows a log written elsewhere and cannot mutate it.
    #[error("store is read-only")]
    ReadOnly,

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the store crate.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
