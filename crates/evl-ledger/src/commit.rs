use chrono::{DateTime, Utc};

use evl_crypto::{ChainCursor, ContentHasher, HashChainVerifier};
use evl_store::{LedgerIndex, StoredEvent};
use evl_types::{Digest, Event, EventContent, EventInput, DEFAULT_DATA_CONTENT_TYPE, SPEC_VERSION};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::license::LicenseState;
use crate::precondition::Precondition;
use crate::schema::SchemaValidator;

/// Everything a commit is checked against besides ledger contents.
pub(crate) struct CommitPolicy<'a> {
    pub config: &'a LedgerConfig,
    pub license: &'a dyn LicenseState,
    pub schemas: &'a dyn SchemaValidator,
}

/// Validate a batch and materialize it as a contiguous, hash-linked run
/// continuing `index`.
///
/// Pure with respect to the store: nothing is written. The caller must hold
/// the writer lock from this call until the records are appended.
///
/// Checks run in order and stop at the first failure: per-event shape and
/// size, schema, event cap, then preconditions.
pub(crate) fn prepare_batch(
    index: &LedgerIndex,
    policy: &CommitPolicy<'_>,
    inputs: &[EventInput],
    preconditions: &[Precondition],
    now: DateTime<Utc>,
) -> LedgerResult<Vec<StoredEvent>> {
    if inputs.is_empty() {
        return Err(LedgerError::InvalidArgument("commit batch is empty".into()));
    }

    let mut contents = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let content = input.content().map_err(|e| LedgerError::at_event(i, e))?;
        let size = input.encoded_size().map_err(|e| LedgerError::at_event(i, e))?;
        if size > policy.config.max_event_size {
            return Err(LedgerError::at_event(
                i,
                format!(
                    "serialized size {size} bytes exceeds limit of {} bytes",
                    policy.config.max_event_size
                ),
            ));
        }
        if let EventContent::Data(data) = &content {
            policy
                .schemas
                .validate(&input.event_type, data)
                .map_err(|reason| {
                    LedgerError::at_event(i, format!("schema check for '{}' failed: {reason}", input.event_type))
                })?;
        }
        contents.push(content);
    }

    if !policy.license.is_licensed() {
        let cap = policy.config.unlicensed_event_cap;
        let current = index.len() as u64;
        let requested = inputs.len() as u64;
        if current + requested > cap {
            return Err(LedgerError::ResourceExhausted {
                cap,
                current,
                requested,
            });
        }
    }

    for (i, precondition) in preconditions.iter().enumerate() {
        precondition.validate()?;
        precondition
            .evaluate(index)
            .map_err(|reason| LedgerError::PreconditionFailed {
                index: i,
                precondition: precondition.name(),
                reason,
            })?;
    }

    // One timestamp per batch, never earlier than the tail.
    let time = match index.tail() {
        Some(tail) if tail.event.time > now => tail.event.time,
        _ => now,
    };
    let mut cursor = index
        .tail()
        .map(|tail| ChainCursor::after(&tail.event))
        .unwrap_or_default();

    let mut records = Vec::with_capacity(inputs.len());
    for (input, content) in inputs.iter().zip(contents) {
        let content_digest =
            ContentHasher::content_digest(&content).map_err(|e| LedgerError::Codec(e.to_string()))?;
        let mut event = Event {
            specversion: SPEC_VERSION.into(),
            id: cursor.next_id,
            time,
            source: input.source.clone(),
            subject: input.subject.clone(),
            event_type: input.event_type.clone(),
            datacontenttype: DEFAULT_DATA_CONTENT_TYPE.into(),
            content,
            predecessorhash: cursor.predecessor,
            hash: Digest::zero(),
            traceparent: input.options.traceparent.clone(),
            tracestate: input.options.tracestate.clone(),
        };
        event.hash = HashChainVerifier::compute_hash(&event, &content_digest)
            .map_err(|e| LedgerError::Codec(e.to_string()))?;
        cursor = ChainCursor::after(&event);
        records.push(StoredEvent::new(event, content_digest));
    }
    Ok(records)
}
