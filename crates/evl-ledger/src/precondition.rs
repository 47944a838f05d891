use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use evl_store::LedgerIndex;
use evl_types::validate_subject;

use crate::error::{LedgerError, LedgerResult};
use crate::query::latest_of_type;

/// An assertion about ledger state that must hold for a commit to proceed.
///
/// On the wire a precondition is `{"type": <tag>, "payload": {...}}`. New
/// kinds are added as new variants; existing tags and payloads never change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Precondition {
    /// No event has ever been recorded on `subject`.
    #[serde(rename_all = "camelCase")]
    IsSubjectPristine { subject: String },

    /// The newest event on `subject`, of any type, has id `event_id`.
    #[serde(rename_all = "camelCase")]
    IsSubjectOnEventId { subject: String, event_id: u64 },

    /// The newest event of `event_type` on `subject` has id `expected_id`.
    #[serde(rename_all = "camelCase")]
    LatestEventOfTypeHasId {
        subject: String,
        event_type: String,
        expected_id: u64,
    },
}

impl Precondition {
    /// Wire tags of every known precondition.
    pub const TAGS: [&'static str; 3] = [
        "isSubjectPristine",
        "isSubjectOnEventId",
        "latestEventOfTypeHasId",
    ];

    pub fn subject_pristine(subject: impl Into<String>) -> Self {
        Self::IsSubjectPristine {
            subject: subject.into(),
        }
    }

    pub fn subject_on_event(subject: impl Into<String>, event_id: u64) -> Self {
        Self::IsSubjectOnEventId {
            subject: subject.into(),
            event_id,
        }
    }

    pub fn latest_of_type_has_id(
        subject: impl Into<String>,
        event_type: impl Into<String>,
        expected_id: u64,
    ) -> Self {
        Self::LatestEventOfTypeHasId {
            subject: subject.into(),
            event_type: event_type.into(),
            expected_id,
        }
    }

    /// The wire tag of this precondition.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsSubjectPristine { .. } => Self::TAGS[0],
            Self::IsSubjectOnEventId { .. } => Self::TAGS[1],
            Self::LatestEventOfTypeHasId { .. } => Self::TAGS[2],
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            Self::IsSubjectPristine { subject }
            | Self::IsSubjectOnEventId { subject, .. }
            | Self::LatestEventOfTypeHasId { subject, .. } => subject,
        }
    }

    /// Check the payload is well formed.
    pub fn validate(&self) -> LedgerResult<()> {
        validate_subject(self.subject())
            .map_err(|e| LedgerError::InvalidArgument(format!("{}: {e}", self.name())))?;
        if let Self::LatestEventOfTypeHasId { event_type, .. } = self {
            if event_type.trim().is_empty() {
                return Err(LedgerError::InvalidArgument(format!(
                    "{}: field 'eventType' must not be empty",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    /// Evaluate against `index`. The error is the reason it does not hold.
    pub fn evaluate(&self, index: &LedgerIndex) -> Result<(), String> {
        match self {
            Self::IsSubjectPristine { subject } => match index.subject_ids(subject).len() {
                0 => Ok(()),
                n => Err(format!("subject {subject} already has {n} events")),
            },
            Self::IsSubjectOnEventId { subject, event_id } => {
                match index.subject_ids(subject).last() {
                    Some(latest) if latest == event_id => Ok(()),
                    Some(latest) => Err(format!(
                        "subject {subject} is on event {latest}, expected {event_id}"
                    )),
                    None => Err(format!("subject {subject} has no events, expected {event_id}")),
                }
            }
            Self::LatestEventOfTypeHasId {
                subject,
                event_type,
                expected_id,
            } => match latest_of_type(index, subject, event_type) {
                Some(latest) if latest.id() == *expected_id => Ok(()),
                Some(latest) => Err(format!(
                    "latest {event_type} on {subject} is event {}, expected {expected_id}",
                    latest.id()
                )),
                None => Err(format!(
                    "subject {subject} has no {event_type} event, expected {expected_id}"
                )),
            },
        }
    }
}

/// A precondition as received from a caller, before its tag is resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPrecondition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl TryFrom<RawPrecondition> for Precondition {
    type Error = LedgerError;

    fn try_from(raw: RawPrecondition) -> LedgerResult<Self> {
        if !Self::TAGS.contains(&raw.kind.as_str()) {
            return Err(LedgerError::InvalidArgument(format!(
                "unknown precondition type '{}'",
                raw.kind
            )));
        }
        let precondition: Self = serde_json::from_value(json!({
            "type": raw.kind,
            "payload": raw.payload,
        }))
        .map_err(|e| LedgerError::InvalidArgument(format!("precondition '{}': {e}", raw.kind)))?;
        precondition.validate()?;
        Ok(precondition)
    }
}
