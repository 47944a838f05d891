use tracing::info;

use evl_store::LedgerStore;
use evl_types::validate_subject;

use crate::error::{LedgerError, LedgerResult};

/// Replace the payload of every event on `subject` with the erasure marker.
///
/// Ids, times, hashes, and retained content digests stay as they are, so
/// the chain keeps verifying. Erasing an erased subject changes nothing and
/// returns 0. A subject that never had events is `NotFound`.
pub(crate) fn erase_subject(store: &mut dyn LedgerStore, subject: &str) -> LedgerResult<u64> {
    validate_subject(subject)?;
    let ids = store.index().subject_ids(subject).to_vec();
    if ids.is_empty() {
        return Err(LedgerError::NotFound(format!("subject {subject} has no events")));
    }
    let erased = store.redact(&ids)?;
    info!(subject, events = ids.len(), erased, "subject erased");
    Ok(erased)
}
