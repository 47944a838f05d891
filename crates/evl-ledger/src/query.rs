use serde::{Deserialize, Serialize};

use evl_store::{LedgerIndex, StoredEvent};
use evl_types::{validate_subject, Event};

use crate::error::LedgerResult;

/// Options for a bounded read of one subject.
///
/// Bounds are event ids. Each bound is inclusive unless its
/// `include_*_bound_event` flag is cleared; an absent bound leaves that side
/// open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub lower_bound: Option<u64>,
    pub include_lower_bound_event: bool,
    pub upper_bound: Option<u64>,
    pub include_upper_bound_event: bool,
    /// Return only the newest event of this type; bounds are ignored.
    pub latest_by_event_type: Option<String>,
    /// Match descendants of the subject as well as the subject itself.
    pub recursive: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            lower_bound: None,
            include_lower_bound_event: true,
            upper_bound: None,
            include_upper_bound_event: true,
            latest_by_event_type: None,
            recursive: false,
        }
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lower_bound(mut self, id: u64, inclusive: bool) -> Self {
        self.lower_bound = Some(id);
        self.include_lower_bound_event = inclusive;
        self
    }

    pub fn upper_bound(mut self, id: u64, inclusive: bool) -> Self {
        self.upper_bound = Some(id);
        self.include_upper_bound_event = inclusive;
        self
    }

    pub fn latest_by_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.latest_by_event_type = Some(event_type.into());
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// The inclusive id range selected by the bounds, or `None` if empty.
    fn id_range(&self) -> Option<(u64, u64)> {
        let low = match self.lower_bound {
            Some(id) if self.include_lower_bound_event => id,
            Some(id) => id.checked_add(1)?,
            None => 1,
        };
        let high = match self.upper_bound {
            Some(id) if self.include_upper_bound_event => id,
            Some(id) => id.checked_sub(1)?,
            None => u64::MAX,
        };
        (low <= high).then_some((low, high))
    }
}

/// Read the events of `subject` selected by `options`, in ascending id order.
pub(crate) fn stream(
    index: &LedgerIndex,
    subject: &str,
    options: &StreamOptions,
) -> LedgerResult<Vec<Event>> {
    validate_subject(subject)?;

    if let Some(event_type) = &options.latest_by_event_type {
        let latest = if options.recursive {
            index
                .subjects_within(subject)
                .filter_map(|s| latest_of_type(index, s, event_type))
                .max_by_key(|record| record.id())
        } else {
            latest_of_type(index, subject, event_type)
        };
        return Ok(latest.map(|record| record.event.clone()).into_iter().collect());
    }

    let Some((low, high)) = options.id_range() else {
        return Ok(Vec::new());
    };

    let mut ids: Vec<u64> = if options.recursive {
        let mut ids: Vec<u64> = index
            .subjects_within(subject)
            .flat_map(|s| ids_in_range(index.subject_ids(s), low, high).iter().copied())
            .collect();
        ids.sort_unstable();
        ids
    } else {
        ids_in_range(index.subject_ids(subject), low, high).to_vec()
    };
    ids.dedup();

    Ok(ids
        .into_iter()
        .filter_map(|id| index.get(id))
        .map(|record| record.event.clone())
        .collect())
}

/// Newest event of `event_type` recorded exactly on `subject`.
pub(crate) fn latest_of_type<'a>(
    index: &'a LedgerIndex,
    subject: &str,
    event_type: &str,
) -> Option<&'a StoredEvent> {
    index
        .subject_ids(subject)
        .iter()
        .rev()
        .filter_map(|&id| index.get(id))
        .find(|record| record.event.event_type == event_type)
}

fn ids_in_range(ids: &[u64], low: u64, high: u64) -> &[u64] {
    let start = ids.partition_point(|&id| id < low);
    let end = ids.partition_point(|&id| id <= high);
    &ids[start..end.max(start)]
}
