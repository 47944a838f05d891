use serde::{Deserialize, Serialize};

use evl_crypto::{ChainCursor, ChainError, HashChainVerifier};
use evl_store::{LedgerIndex, StoredEvent};
use evl_types::{validate_subject, Digest};

use crate::error::LedgerResult;

/// What an audit covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditScope {
    /// The whole global chain.
    All,
    /// Every event of one subject, each checked against its global predecessor.
    Subject(String),
}

/// Where a chain break was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Ids are missing, repeated, or out of order.
    Sequence,
    /// The payload no longer matches its retained digest.
    Content,
    /// The stored hash does not match the recomputed envelope hash.
    Envelope,
    /// The predecessor hash does not match the previous event's hash.
    Linkage,
}

/// The first break found by an audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditBreak {
    pub id: u64,
    pub kind: BreakKind,
    pub reason: String,
}

impl From<ChainError> for AuditBreak {
    fn from(err: ChainError) -> Self {
        let kind = match &err {
            ChainError::SequenceGap { .. } => BreakKind::Sequence,
            ChainError::BrokenLink { .. } => BreakKind::Linkage,
            ChainError::ContentMismatch { .. } | ChainError::ErasureMarkerMissing { .. } => {
                BreakKind::Content
            }
            ChainError::HashMismatch { .. } | ChainError::Hashing { .. } => BreakKind::Envelope,
        };
        Self {
            id: err.id(),
            kind,
            reason: err.to_string(),
        }
    }
}

/// Outcome of an audit. A broken chain is reported here, not as an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub valid: bool,
    pub scope: AuditScope,
    /// Events verified intact before the first break, or all of them.
    pub events_checked: u64,
    pub first_break: Option<AuditBreak>,
}

impl AuditReport {
    fn finish(scope: AuditScope, events_checked: u64, first_break: Option<AuditBreak>) -> Self {
        Self {
            valid: first_break.is_none(),
            scope,
            events_checked,
            first_break,
        }
    }
}

/// Walk `records` as a chain starting from genesis.
pub(crate) fn audit_records(records: &[StoredEvent]) -> AuditReport {
    let mut cursor = ChainCursor::genesis();
    for (checked, record) in records.iter().enumerate() {
        // The verifier stops on the first bad record; verifying one at a
        // time keeps the count of intact events.
        match HashChainVerifier::verify_chain(std::iter::once(record), cursor) {
            Ok(next) => cursor = next,
            Err(err) => {
                return AuditReport::finish(AuditScope::All, checked as u64, Some(err.into()));
            }
        }
    }
    AuditReport::finish(AuditScope::All, records.len() as u64, None)
}

/// The events of one subject paired with the hash of the global event
/// before each, copied out of the index so they can be verified without
/// holding it.
#[derive(Debug)]
pub(crate) struct SubjectSlice {
    subject: String,
    entries: Vec<(StoredEvent, Digest)>,
    /// `(expected, found)` ids where the subject's sequence broke off.
    gap: Option<(u64, u64)>,
}

impl SubjectSlice {
    /// Collect `subject`'s events from `index`. Ids must strictly increase
    /// and every predecessor must be present; the slice ends at the first
    /// place that does not hold.
    pub(crate) fn capture(index: &LedgerIndex, subject: &str) -> LedgerResult<Self> {
        validate_subject(subject)?;
        let mut entries = Vec::new();
        let mut gap = None;
        let mut previous_id = 0;
        for &id in index.subject_ids(subject) {
            let found = index.get(id).filter(|r| r.id() == id && r.event.subject == subject);
            let record = match found {
                Some(record) if id > previous_id => record,
                _ => {
                    gap = Some((previous_id + 1, id));
                    break;
                }
            };
            let predecessor = match id {
                1 => Digest::zero(),
                _ => match index.get(id - 1) {
                    Some(prev) => prev.event.hash,
                    None => {
                        gap = Some((id - 1, id));
                        break;
                    }
                },
            };
            entries.push((record.clone(), predecessor));
            previous_id = id;
        }
        Ok(Self {
            subject: subject.to_string(),
            entries,
            gap,
        })
    }
}

/// Check one subject: each event must verify against the hash of the global
/// event before it.
pub(crate) fn audit_subject(slice: &SubjectSlice) -> AuditReport {
    let scope = AuditScope::Subject(slice.subject.clone());
    for (checked, (record, predecessor)) in slice.entries.iter().enumerate() {
        if let Err(err) = HashChainVerifier::verify_record(record, predecessor) {
            return AuditReport::finish(scope, checked as u64, Some(err.into()));
        }
    }
    let checked = slice.entries.len() as u64;
    let first_break = slice
        .gap
        .map(|(expected, found)| ChainError::SequenceGap { expected, found }.into());
    AuditReport::finish(scope, checked, first_break)
}
