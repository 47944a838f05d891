use evl_types::{Digest, Event};

use crate::codec::Envelope;
use crate::hasher::{ContentHasher, HasherError};

/// A stored event that participates in the hash chain.
///
/// The content digest is retained next to the event so that the chain still
/// verifies after the payload has been replaced by the erasure marker.
pub trait ChainedRecord {
    /// The committed event as currently stored.
    fn event(&self) -> &Event;
    /// Digest of the payload as it was at commit time.
    fn content_digest(&self) -> Digest;
    /// Returns `true` if the payload was erased after commit.
    fn is_redacted(&self) -> bool;
}

/// Position in a chain walk: the id and predecessor hash the next record
/// must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainCursor {
    pub next_id: u64,
    pub predecessor: Digest,
}

impl ChainCursor {
    /// Cursor before the first event of a ledger.
    pub fn genesis() -> Self {
        Self {
            next_id: 1,
            predecessor: Digest::zero(),
        }
    }

    /// Cursor positioned directly after `event`.
    pub fn after(event: &Event) -> Self {
        Self {
            next_id: event.id + 1,
            predecessor: event.hash,
        }
    }
}

impl Default for ChainCursor {
    fn default() -> Self {
        Self::genesis()
    }
}

/// Hash chain integrity verifier.
///
/// A record is intact when its predecessor hash matches the hash of the
/// record before it, its payload still matches the retained content digest
/// (or is the erasure marker, if redacted), and its stored hash matches the
/// hash recomputed from the envelope.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a single record against the hash its predecessor carries.
    ///
    /// Checks run linkage first, then content, then the envelope hash.
    pub fn verify_record<R: ChainedRecord + ?Sized>(
        record: &R,
        expected_predecessor: &Digest,
    ) -> Result<(), ChainError> {
        let event = record.event();
        let retained = record.content_digest();

        if event.predecessorhash != *expected_predecessor {
            return Err(ChainError::BrokenLink { id: event.id });
        }

        if record.is_redacted() {
            if !event.content.is_tombstone() {
                return Err(ChainError::ErasureMarkerMissing { id: event.id });
            }
        } else {
            let current = ContentHasher::content_digest(&event.content)
                .map_err(|source| ChainError::Hashing { id: event.id, source })?;
            if current != retained {
                return Err(ChainError::ContentMismatch { id: event.id });
            }
        }

        let computed = Self::compute_hash(event, &retained)?;
        if computed != event.hash {
            return Err(ChainError::HashMismatch { id: event.id });
        }
        Ok(())
    }

    /// Verify a contiguous run of records starting at `start`.
    ///
    /// Returns the cursor after the last record, so a long chain can be
    /// verified in pieces.
    pub fn verify_chain<'a, R, I>(records: I, start: ChainCursor) -> Result<ChainCursor, ChainError>
    where
        R: ChainedRecord + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let mut cursor = start;
        for record in records {
            let event = record.event();
            if event.id != cursor.next_id {
                return Err(ChainError::SequenceGap {
                    expected: cursor.next_id,
                    found: event.id,
                });
            }
            Self::verify_record(record, &cursor.predecessor)?;
            cursor = ChainCursor::after(event);
        }
        Ok(cursor)
    }

    /// Compute the hash an event should carry, given its commit-time content
    /// digest. Uses the predecessor hash stored on the event.
    pub fn compute_hash(event: &Event, content_digest: &Digest) -> Result<Digest, ChainError> {
        ContentHasher::event_hash(&Envelope::of(event), &event.predecessorhash, content_digest)
            .map_err(|source| ChainError::Hashing { id: event.id, source })
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("sequence gap: expected event {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("broken link at event {id}: predecessor hash does not match")]
    BrokenLink { id: u64 },

    #[error("content mismatch at event {id}: payload differs from its digest")]
    ContentMismatch { id: u64 },

    #[error("event {id} is marked erased but does not carry the erasure marker")]
    ErasureMarkerMissing { id: u64 },

    #[error("hash mismatch at event {id}: computed hash differs from stored")]
    HashMismatch { id: u64 },

    #[error("hashing failed at event {id}: {source}")]
    Hashing {
        id: u64,
        #[source]
        source: HasherError,
    },
}

impl ChainError {
    /// Id of the first event found broken.
    pub fn id(&self) -> u64 {
        match self {
            Self::SequenceGap { found, .. } => *found,
            Self::BrokenLink { id }
            | Self::ContentMismatch { id }
            | Self::ErasureMarkerMissing { id }
            | Self::HashMismatch { id }
            | Self::Hashing { id, .. } => *id,
        }
    }
}
