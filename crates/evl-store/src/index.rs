use std::collections::BTreeMap;

use evl_types::{is_within, EventContent};

use crate::error::{StoreError, StoreResult};
use crate::record::StoredEvent;

/// Ordered event log with secondary indexes by subject and event type.
///
/// Events are held densely: the event with id `n` sits at position `n - 1`.
/// The index is the shared in-memory state of every store backend; durable
/// backends rebuild it from disk on open.
#[derive(Clone, Debug, Default)]
pub struct LedgerIndex {
    records: Vec<StoredEvent>,
    subjects: BTreeMap<String, Vec<u64>>,
    types: BTreeMap<String, u64>,
}

impl LedgerIndex {
    /// Build an index from records already in id order.
    pub fn from_records(records: Vec<StoredEvent>) -> StoreResult<Self> {
        let mut index = Self::default();
        index.extend(records)?;
        Ok(index)
    }

    /// Id the next appended event must carry.
    pub fn next_id(&self) -> u64 {
        self.records.len() as u64 + 1
    }

    /// Id of the newest event, or 0 for an empty ledger.
    pub fn last_id(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The newest event.
    pub fn tail(&self) -> Option<&StoredEvent> {
        self.records.last()
    }

    pub fn get(&self, id: u64) -> Option<&StoredEvent> {
        if id == 0 {
            return None;
        }
        self.records.get((id - 1) as usize)
    }

    /// All events in id order.
    pub fn records(&self) -> &[StoredEvent] {
        &self.records
    }

    /// Events with id `>= id`, in id order.
    pub fn records_from(&self, id: u64) -> &[StoredEvent] {
        let start = (id.max(1) - 1) as usize;
        self.records.get(start..).unwrap_or(&[])
    }

    /// Ids of events recorded exactly on `subject`, ascending.
    pub fn subject_ids(&self, subject: &str) -> &[u64] {
        self.subjects.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every subject with at least one event, sorted.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects.keys().map(String::as_str)
    }

    /// Subjects equal to or below `base`, sorted.
    pub fn subjects_within<'a>(&'a self, base: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.subjects().filter(move |s| is_within(s, base))
    }

    /// Every event type ever recorded, sorted.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Check that `records` would continue the id sequence without gaps.
    pub fn check_continues(&self, records: &[StoredEvent]) -> StoreResult<()> {
        let mut expected = self.next_id();
        for record in records {
            if record.id() != expected {
                return Err(StoreError::OutOfOrder {
                    expected,
                    found: record.id(),
                });
            }
            expected += 1;
        }
        Ok(())
    }

    /// Append records that continue the id sequence.
    ///
    /// The whole batch is checked before anything is inserted, so a bad
    /// batch leaves the index untouched.
    pub fn extend(&mut self, records: Vec<StoredEvent>) -> StoreResult<()> {
        self.check_continues(&records)?;
        for record in records {
            self.subjects
                .entry(record.event.subject.clone())
                .or_default()
                .push(record.id());
            *self.types.entry(record.event.event_type.clone()).or_default() += 1;
            self.records.push(record);
        }
        Ok(())
    }

    /// Replace the payload of each listed event with the erasure marker.
    ///
    /// Unknown ids fail the whole call before any change. Returns how many
    /// events changed; already erased events are left as they are.
    pub fn redact(&mut self, ids: &[u64]) -> StoreResult<u64> {
        if let Some(&missing) = ids.iter().find(|&&id| self.get(id).is_none()) {
            return Err(StoreError::UnknownEvent(missing));
        }
        let mut changed = 0;
        for &id in ids {
            let record = &mut self.records[(id - 1) as usize];
            if record.redacted {
                continue;
            }
            record.event.content = EventContent::tombstone();
            record.redacted = true;
            changed += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    fn index(specs: &[(&str, &str)]) -> LedgerIndex {
        let records = specs
            .iter()
            .enumerate()
            .map(|(i, (subject, ty))| record(i as u64 + 1, subject, ty))
            .collect();
        LedgerIndex::from_records(records).unwrap()
    }

    #[test]
    fn empty_index() {
        let index = LedgerIndex::default();
        assert_eq!(index.last_id(), 0);
        assert_eq!(index.next_id(), 1);
        assert!(index.tail().is_none());
        assert!(index.get(0).is_none());
        assert!(index.get(1).is_none());
    }

    #[test]
    fn positions_follow_ids() {
        let index = index(&[("/a", "t1"), ("/b", "t2"), ("/a", "t1")]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(2).unwrap().event.subject, "/b");
        assert_eq!(index.tail().unwrap().id(), 3);
        assert_eq!(index.records_from(2).len(), 2);
        assert!(index.records_from(9).is_empty());
    }

    #[test]
    fn secondary_indexes_are_sorted() {
        let index = index(&[("/z", "b"), ("/a/1", "a"), ("/a", "c"), ("/a/1", "a")]);
        assert_eq!(index.subject_ids("/a/1"), &[2, 4]);
        assert!(index.subject_ids("/missing").is_empty());
        assert_eq!(index.subjects().collect::<Vec<_>>(), vec!["/a", "/a/1", "/z"]);
        assert_eq!(index.event_types().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(index.subject_count(), 3);
        assert_eq!(index.type_count(), 3);
    }

    #[test]
    fn subjects_within_respects_segments() {
        let index = index(&[("/a", "t"), ("/a/b", "t"), ("/ab", "t")]);
        assert_eq!(index.subjects_within("/a").collect::<Vec<_>>(), vec!["/a", "/a/b"]);
        assert_eq!(index.subjects_within("/").count(), 3);
    }

    #[test]
    fn out_of_order_batch_leaves_index_untouched() {
        let mut index = index(&[("/a", "t")]);
        let err = index
            .extend(vec![record(2, "/a", "t"), record(4, "/a", "t")])
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { expected: 3, found: 4 }));
        assert_eq!(index.len(), 1);
        assert_eq!(index.subject_ids("/a"), &[1]);
    }

    #[test]
    fn redact_marks_and_counts() {
        let mut index = index(&[("/a", "t"), ("/b", "t"), ("/a", "t")]);
        assert_eq!(index.redact(&[1, 3]).unwrap(), 2);
        assert!(index.get(1).unwrap().redacted);
        assert!(index.get(1).unwrap().event.is_erased());
        assert!(!index.get(2).unwrap().redacted);

        assert_eq!(index.redact(&[1]).unwrap(), 0);
    }

    #[test]
    fn redact_unknown_id_changes_nothing() {
        let mut index = index(&[("/a", "t")]);
        let err = index.redact(&[1, 7]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownEvent(7)));
        assert!(!index.get(1).unwrap().redacted);
    }
}
