use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Key of the marker object that replaces erased payloads.
pub(crate) const ERASED_KEY: &str = "$erased";

/// Payload of an event: inline `data` or a `ref` pointing at externally
/// stored content. Exactly one is present on every event.
///
/// On the wire the variant name is the JSON key, so an event carries either
/// a `"data"` or a `"ref"` member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventContent {
    /// Inline structured document.
    Data(Value),
    /// Structured pointer to an externally stored payload.
    Ref(Value),
}

impl EventContent {
    /// The fixed marker left behind when a subject is erased.
    pub fn tombstone() -> Self {
        Self::Data(json!({ ERASED_KEY: true }))
    }

    /// Returns `true` if this content is the erasure marker.
    pub fn is_tombstone(&self) -> bool {
        match self {
            Self::Data(Value::Object(map)) => {
                map.len() == 1 && map.get(ERASED_KEY) == Some(&Value::Bool(true))
            }
            _ => false,
        }
    }

    /// Inline data, if this is a `data` payload.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Ref(_) => None,
        }
    }

    /// External reference, if this is a `ref` payload.
    pub fn reference(&self) -> Option<&Value> {
        match self {
            Self::Ref(value) => Some(value),
            Self::Data(_) => None,
        }
    }

    /// Short label used in digests and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Ref(_) => "ref",
        }
    }
}
