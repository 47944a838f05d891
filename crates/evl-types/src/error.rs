use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("invalid subject '{0}': must start with '/'")]
    InvalidSubject(String),

    #[error("event must carry either 'data' or 'ref'")]
    MissingContent,

    #[error("event must not carry both 'data' and 'ref'")]
    AmbiguousContent,

    /// User data may not use a key the ledger reserves for itself.
    #[error("data must not use the reserved top-level key '{0}'")]
    ReservedKey(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),
}
