use evl_types::{Digest, EventContent};

use crate::codec::{canonical_json, digest_input, CodecError, Envelope};

/// BLAKE3 hasher with a domain-separation prefix.
///
/// Payload digests and envelope hashes use different domains, so a payload
/// can never be passed off as an envelope or the other way round.
#[derive(Clone, Debug)]
pub struct ContentHasher {
    domain: &'static [u8],
}

impl ContentHasher {
    /// Domain for inline `data` payload digests.
    pub const DATA: Self = Self {
        domain: b"evl-data-v1",
    };
    /// Domain for `ref` payload digests.
    pub const REF: Self = Self {
        domain: b"evl-ref-v1",
    };
    /// Domain for envelope hashes.
    pub const EVENT: Self = Self {
        domain: b"evl-event-v1",
    };

    /// Hash arbitrary bytes under this domain.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain);
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Returns `true` if `data` hashes to `expected` under this domain.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// The domain prefix in use.
    pub fn domain(&self) -> &[u8] {
        self.domain
    }

    /// Digest of an event payload: the canonical JSON of the document under
    /// the domain matching its kind.
    pub fn content_digest(content: &EventContent) -> Result<Digest, HasherError> {
        let (hasher, value) = match content {
            EventContent::Data(value) => (Self::DATA, value),
            EventContent::Ref(value) => (Self::REF, value),
        };
        Ok(hasher.hash(&canonical_json(value)?))
    }

    /// Hash of an event: the envelope, its predecessor hash, and its
    /// content digest.
    pub fn event_hash(
        envelope: &Envelope<'_>,
        predecessor: &Digest,
        content_digest: &Digest,
    ) -> Result<Digest, HasherError> {
        let input = digest_input(envelope, predecessor, content_digest)?;
        Ok(Self::EVENT.hash(&input))
    }
}

/// Errors from hashing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error(transparent)]
    Codec(#[from] CodecError),
}
