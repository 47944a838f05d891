//! Operation surface of the Event Ledger.
//!
//! Defines the request and response shapes of every ledger operation and a
//! [`LedgerService`] that dispatches them against a [`evl_ledger::Ledger`].
//! Framing, transport security, and token validation belong to whatever
//! carries these messages; the service only needs to be told who is calling.

pub mod auth;
pub mod error;
pub mod message;
pub mod service;

pub use auth::CallerIdentity;
pub use error::{ServiceError, ServiceResult};
pub use message::{ErrorBody, ObserveRequest, Request, Response};
pub use service::LedgerService;
