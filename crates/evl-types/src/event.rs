use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::{EventContent, ERASED_KEY};
use crate::digest::Digest;
use crate::error::TypeError;
use crate::subject::validate_subject;

/// `specversion` stamped on every committed event.
pub const SPEC_VERSION: &str = "1.0";

/// Content type stamped on every committed event.
pub const DEFAULT_DATA_CONTENT_TYPE: &str = "application/json";

/// Caller-supplied extras carried alongside an event.
///
/// Nothing here influences an event's identity or hash: the fields are
/// tracing context propagated to readers as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOptions {
    /// W3C trace context `traceparent` header value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
    /// W3C trace context `tracestate` header value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracestate: Option<String>,
}

/// The pre-commit shape of an event, as supplied by a producer.
///
/// `data` and `ref` are both optional on the wire so that malformed input
/// can be rejected with a precise reason instead of a parse failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    pub source: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Value>,
    #[serde(default)]
    pub options: EventOptions,
}

impl EventInput {
    /// Build an input carrying inline `data`.
    pub fn with_data(
        source: impl Into<String>,
        subject: impl Into<String>,
        event_type: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            source: source.into(),
            subject: subject.into(),
            event_type: event_type.into(),
            data: Some(data),
            reference: None,
            options: EventOptions::default(),
        }
    }

    /// Build an input carrying an external `ref`.
    pub fn with_ref(
        source: impl Into<String>,
        subject: impl Into<String>,
        event_type: impl Into<String>,
        reference: Value,
    ) -> Self {
        Self {
            source: source.into(),
            subject: subject.into(),
            event_type: event_type.into(),
            data: None,
            reference: Some(reference),
            options: EventOptions::default(),
        }
    }

    /// Validate the envelope fields and resolve the payload.
    ///
    /// Checks run in field order so the first reported problem is stable.
    pub fn content(&self) -> Result<EventContent, TypeError> {
        if self.source.trim().is_empty() {
            return Err(TypeError::EmptyField("source"));
        }
        validate_subject(&self.subject)?;
        if self.event_type.trim().is_empty() {
            return Err(TypeError::EmptyField("type"));
        }
        match (&self.data, &self.reference) {
            (Some(data), None) if data.get(ERASED_KEY).is_some() => {
                Err(TypeError::ReservedKey(ERASED_KEY))
            }
            (Some(data), None) => Ok(EventContent::Data(data.clone())),
            (None, Some(reference)) => Ok(EventContent::Ref(reference.clone())),
            (None, None) => Err(TypeError::MissingContent),
            (Some(_), Some(_)) => Err(TypeError::AmbiguousContent),
        }
    }

    /// Size in bytes of the input's JSON encoding.
    pub fn encoded_size(&self) -> Result<usize, TypeError> {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len())
            .map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

/// A committed event. Immutable apart from payload erasure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub specversion: String,
    /// Global ledger position, starting at 1.
    pub id: u64,
    /// Commit timestamp assigned by the ledger.
    pub time: DateTime<Utc>,
    pub source: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub datacontenttype: String,
    #[serde(flatten)]
    pub content: EventContent,
    /// Hash of the event at `id - 1`, or the zero digest for the first event.
    pub predecessorhash: Digest,
    pub hash: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceparent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracestate: Option<String>,
}

impl Event {
    /// Returns `true` if the payload has been replaced by the erasure marker.
    pub fn is_erased(&self) -> bool {
        self.content.is_tombstone()
    }
}
