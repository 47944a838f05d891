use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use evl_crypto::{ChainCursor, ContentHasher, HashChainVerifier};
use evl_types::{Digest, Event, EventContent, DEFAULT_DATA_CONTENT_TYPE, SPEC_VERSION};

use crate::record::StoredEvent;

/// A stored event with the given id. Hashes are not chained.
pub(crate) fn record(id: u64, subject: &str, event_type: &str) -> StoredEvent {
    let content = EventContent::Data(json!({ "n": id }));
    let digest = ContentHasher::content_digest(&content).unwrap();
    StoredEvent::new(
        Event {
            specversion: SPEC_VERSION.into(),
            id,
            time: base_time() + Duration::milliseconds(id as i64),
            source: "https://store.test".into(),
            subject: subject.into(),
            event_type: event_type.into(),
            datacontenttype: DEFAULT_DATA_CONTENT_TYPE.into(),
            content,
            predecessorhash: Digest::zero(),
            hash: Digest::zero(),
            traceparent: None,
            tracestate: None,
        },
        digest,
    )
}

/// `count` stored events forming a valid hash chain from genesis.
pub(crate) fn chained(count: u64) -> Vec<StoredEvent> {
    let mut cursor = ChainCursor::genesis();
    let mut out = Vec::new();
    for _ in 0..count {
        let mut stored = record(cursor.next_id, &format!("/s/{}", cursor.next_id % 2), "t");
        stored.event.predecessorhash = cursor.predecessor;
        stored.event.hash =
            HashChainVerifier::compute_hash(&stored.event, &stored.content_digest).unwrap();
        cursor = ChainCursor::after(&stored.event);
        out.push(stored);
    }
    out
}

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}
