use serde::{Deserialize, Serialize};

use evl_crypto::ChainedRecord;
use evl_types::{Digest, Event};

/// A committed event as held by a store.
///
/// `content_digest` is fixed at commit time and survives erasure, which is
/// what lets a redacted event keep verifying inside the hash chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event: Event,
    pub content_digest: Digest,
    #[serde(default)]
    pub redacted: bool,
}

impl StoredEvent {
    /// Wrap a freshly committed event.
    pub fn new(event: Event, content_digest: Digest) -> Self {
        Self {
            event,
            content_digest,
            redacted: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.event.id
    }
}

impl ChainedRecord for StoredEvent {
    fn event(&self) -> &Event {
        &self.event
    }

    fn content_digest(&self) -> Digest {
        self.content_digest
    }

    fn is_redacted(&self) -> bool {
        self.redacted
    }
}
