//! Hash chain codec for the Event Ledger.
//!
//! Provides the deterministic digest input for an event envelope, domain
//! separated BLAKE3 hashing for payloads and envelopes, and verification of
//! the forward-only hash chain that links every committed event to its
//! predecessor.
//!
//! All hashing goes through BLAKE3; no custom cryptography.

pub mod chain;
pub mod codec;
pub mod hasher;

pub use chain::{ChainCursor, ChainError, ChainedRecord, HashChainVerifier};
pub use codec::{canonical_json, digest_input, format_time, CodecError, Envelope};
pub use hasher::{ContentHasher, HasherError};
