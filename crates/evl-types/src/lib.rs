//! Foundation types for the Event Ledger (EVL).
//!
//! This crate provides the event model shared by every other EVL crate.
//!
//! # Key Types
//!
//! - [`Event`]: A committed, hash-chained event at a fixed ledger position
//! - [`EventInput`]: The pre-commit shape supplied by producers
//! - [`EventContent`]: Inline `data` or an external `ref`, never both
//! - [`Digest`]: 256-bit BLAKE3 digest with hex text form
//! - [`subject`]: Subject namespace rules (`/`-rooted, hierarchical)

pub mod content;
pub mod digest;
pub mod error;
pub mod event;
pub mod subject;

pub use content::EventContent;
pub use digest::Digest;
pub use error::TypeError;
pub use event::{
    Event, EventInput, EventOptions, DEFAULT_DATA_CONTENT_TYPE, SPEC_VERSION,
};
pub use subject::{is_within, validate_subject};
