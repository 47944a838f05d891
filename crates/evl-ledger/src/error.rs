use evl_store::StoreError;
use evl_types::TypeError;

/// Coarse classification of a [`LedgerError`], stable across messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    PreconditionFailed,
    ResourceExhausted,
    NotFound,
    IntegrityViolation,
    AlreadyExists,
    Internal,
}

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed input: empty field, bad subject, payload shape, size.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A commit precondition did not hold.
    #[error("precondition {index} ({precondition}) failed: {reason}")]
    PreconditionFailed {
        index: usize,
        precondition: &'static str,
        reason: String,
    },

    /// The unlicensed event cap would be exceeded.
    #[error("event cap of {cap} reached: {current} stored, {requested} requested")]
    ResourceExhausted { cap: u64, current: u64, requested: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    /// Restore or a consistency check found a broken hash chain.
    #[error("integrity violation at event {id}: {reason}")]
    IntegrityViolation { id: u64, reason: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Hashing or encoding failed while building events.
    #[error("codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// No async runtime available for an operation that needs one.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Config(_) | Self::Codec(_) | Self::Store(_) | Self::Runtime(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Invalid argument scoped to one event of a batch.
    pub(crate) fn at_event(index: usize, reason: impl std::fmt::Display) -> Self {
        Self::InvalidArgument(format!("event {index}: {reason}"))
    }
}

impl From<TypeError> for LedgerError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Convenience alias used throughout the ledger crate.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
