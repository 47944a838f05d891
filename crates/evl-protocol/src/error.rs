use evl_ledger::{ErrorKind, LedgerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("caller identity required")]
    Unauthenticated,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ServiceError {
    /// Stable machine-readable code for transports to map onto their own
    /// status vocabulary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Ledger(err) => match err.kind() {
                ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
                ErrorKind::PreconditionFailed => "FAILED_PRECONDITION",
                ErrorKind::ResourceExhausted => "RESOURCE_EXHAUSTED",
                ErrorKind::NotFound => "NOT_FOUND",
                ErrorKind::IntegrityViolation => "DATA_LOSS",
                ErrorKind::AlreadyExists => "ALREADY_EXISTS",
                ErrorKind::Internal => "INTERNAL",
            },
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
