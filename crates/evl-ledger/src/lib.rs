//! Ledger engine for the Event Ledger (EVL).
//!
//! A [`Ledger`] is one append-only, hash-chained sequence of events under a
//! hierarchical subject namespace. This crate provides:
//!
//! - Atomic batch commits guarded by optimistic [`Precondition`]s
//! - Bounded subject streams and latest-of-type reads ([`StreamOptions`])
//! - Cancellable polling subscriptions ([`Observation`])
//! - Whole-ledger and per-subject chain audits ([`AuditReport`])
//! - Payload erasure that keeps every stored hash verifiable
//! - Full backups and audited restore ([`Backup`])
//!
//! # Quick Start
//!
//! ```rust
//! use evl_ledger::{AuditScope, Ledger, Precondition, StreamOptions};
//! use evl_types::EventInput;
//! use serde_json::json;
//!
//! let ledger = Ledger::in_memory();
//! let input = EventInput::with_data(
//!     "https://library.example",
//!     "/books/42",
//!     "io.example.book-acquired",
//!     json!({"title": "Dune"}),
//! );
//! let events = ledger
//!     .commit(&[input], &[Precondition::subject_pristine("/books/42")])
//!     .unwrap();
//! assert_eq!(events[0].id, 1);
//!
//! let stream = ledger.stream("/books/42", &StreamOptions::new()).unwrap();
//! assert_eq!(stream.len(), 1);
//! assert!(ledger.audit(&AuditScope::All).unwrap().valid);
//! ```

pub mod audit;
pub mod backup;
mod commit;
pub mod config;
pub mod error;
pub mod ledger;
pub mod license;
pub mod observe;
pub mod precondition;
pub mod query;
mod redaction;
pub mod schema;

pub use audit::{AuditBreak, AuditReport, AuditScope, BreakKind};
pub use backup::{Backup, BackupFormat, BackupRecord, BACKUP_VERSION};
pub use config::LedgerConfig;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use ledger::{Ledger, LedgerBuilder, LedgerStatus};
pub use license::{LicenseState, Licensed, Unlicensed};
pub use observe::{Observation, ObserveOptions};
pub use precondition::{Precondition, RawPrecondition};
pub use query::StreamOptions;
pub use schema::{NoSchemas, SchemaRegistry, SchemaValidator};

#[cfg(test)]
mod tests {
    use super::*;
    use evl_types::{EventContent, EventInput};
    use serde_json::json;
    use std::time::Duration;

    /// Helper: an input on `subject` with a small payload.
    fn input(subject: &str, event_type: &str, n: u64) -> EventInput {
        EventInput::with_data("https://ledger.example", subject, event_type, json!({"n": n}))
    }

    /// Helper: a ledger holding ids 1..=count on `/s`, all of type `t`.
    fn ledger_with(count: u64) -> Ledger {
        let ledger = Ledger::in_memory();
        let inputs: Vec<EventInput> = (1..=count).map(|n| input("/s", "t", n)).collect();
        ledger.commit(&inputs, &[]).unwrap();
        ledger
    }

    // -----------------------------------------------------------------------
    // 1. Every commit extends one global chain that audits clean
    // -----------------------------------------------------------------------
    #[test]
    fn chain_invariant_holds_across_commits() {
        let ledger = Ledger::in_memory();
        for round in 0..5u64 {
            let batch: Vec<EventInput> = (0..3)
                .map(|i| input(&format!("/s/{}", (round + i) % 4), "t", round * 10 + i))
                .collect();
            ledger.commit(&batch, &[]).unwrap();
        }
        let all: Vec<_> = (1..=15).map(|id| ledger.event(id).unwrap()).collect();
        assert!(all[0].predecessorhash.is_zero());
        for pair in all.windows(2) {
            assert_eq!(pair[1].predecessorhash, pair[0].hash);
            assert_eq!(pair[1].id, pair[0].id + 1);
        }
        let report = ledger.audit(&AuditScope::All).unwrap();
        assert!(report.valid);
        assert_eq!(report.events_checked, 15);
    }

    // -----------------------------------------------------------------------
    // 2. A batch with one bad input appends nothing
    // -----------------------------------------------------------------------
    #[test]
    fn invalid_input_rejects_whole_batch() {
        let ledger = ledger_with(3);
        let mut missing_subject = input("/s", "t", 9);
        missing_subject.subject.clear();

        let err = ledger
            .commit(&[input("/s", "t", 4), missing_subject], &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(ledger.status().unwrap().last_event_id, 3);
    }

    // -----------------------------------------------------------------------
    // 3. Subject-pristine guard admits exactly one commit
    // -----------------------------------------------------------------------
    #[test]
    fn pristine_precondition_acts_as_cas() {
        let ledger = Ledger::in_memory();
        let guard = [Precondition::subject_pristine("/a")];
        ledger.commit(&[input("/a", "created", 1)], &guard).unwrap();

        let err = ledger.commit(&[input("/a", "created", 2)], &guard).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(ledger.status().unwrap().event_count, 1);
    }

    #[test]
    fn latest_of_type_precondition_acts_as_cas() {
        let ledger = Ledger::in_memory();
        ledger.commit(&[input("/acct", "balance", 1)], &[]).unwrap();

        let guard = [Precondition::latest_of_type_has_id("/acct", "balance", 1)];
        ledger.commit(&[input("/acct", "balance", 2)], &guard).unwrap();
        let err = ledger.commit(&[input("/acct", "balance", 3)], &guard).unwrap_err();
        assert!(matches!(err, LedgerError::PreconditionFailed { index: 0, .. }));
    }

    // -----------------------------------------------------------------------
    // 4. Bound semantics
    // -----------------------------------------------------------------------
    #[test]
    fn exclusive_lower_inclusive_upper() {
        let ledger = ledger_with(5);
        let options = StreamOptions::new().lower_bound(2, false).upper_bound(4, true);
        let ids: Vec<u64> = ledger.stream("/s", &options).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    // -----------------------------------------------------------------------
    // 5. Latest-by-type
    // -----------------------------------------------------------------------
    #[test]
    fn latest_by_type_returns_newest_only() {
        let ledger = Ledger::in_memory();
        ledger
            .commit(
                &[
                    input("/s", "U", 1),
                    input("/s", "T", 2),
                    input("/s", "U", 3),
                    input("/s", "U", 4),
                    input("/s", "T", 5),
                ],
                &[],
            )
            .unwrap();
        let events = ledger
            .stream("/s", &StreamOptions::new().latest_by_event_type("T"))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, 5);
    }

    // -----------------------------------------------------------------------
    // 6. Erasure keeps hashes and the audit
    // -----------------------------------------------------------------------
    #[test]
    fn erasure_preserves_audit() {
        let ledger = Ledger::in_memory();
        ledger
            .commit(
                &[input("/s", "t", 1), input("/other", "t", 2), input("/s", "t", 3)],
                &[],
            )
            .unwrap();
        let before = ledger.stream("/s", &StreamOptions::new()).unwrap();

        assert_eq!(ledger.erase("/s").unwrap(), 2);
        assert!(ledger.audit(&AuditScope::All).unwrap().valid);
        assert!(ledger.audit(&AuditScope::Subject("/s".into())).unwrap().valid);

        let after = ledger.stream("/s", &StreamOptions::new()).unwrap();
        assert_eq!(after.len(), before.len());
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(new.content, EventContent::tombstone());
            assert_eq!(new.hash, old.hash);
            assert_eq!(new.predecessorhash, old.predecessorhash);
            assert_eq!(new.time, old.time);
        }
        assert!(!ledger.event(2).unwrap().is_erased());

        assert_eq!(ledger.erase("/s").unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // 7. Observation delivers only new events
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn observation_starts_at_tail() {
        let ledger = ledger_with(10);
        let mut observation = ledger
            .observe("/s", ObserveOptions::new().interval(Duration::from_millis(10)))
            .unwrap();

        ledger.commit(&[input("/s", "t", 11)], &[]).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), observation.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.id, 11);

        observation.cancel();
        assert!(observation.next().await.is_none());
    }

    // -----------------------------------------------------------------------
    // 8. Size limit
    // -----------------------------------------------------------------------
    #[test]
    fn oversized_input_rejected_without_side_effects() {
        let ledger = ledger_with(1);
        let huge = EventInput::with_data("src", "/s", "t", json!({"blob": "x".repeat(64 * 1024)}));
        let err = ledger.commit(&[huge], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(ledger.status().unwrap().event_count, 1);
    }

    // -----------------------------------------------------------------------
    // 9. Backup round-trip
    // -----------------------------------------------------------------------
    #[test]
    fn backup_round_trip_reproduces_ledger() {
        let source = Ledger::in_memory();
        source
            .commit(&[input("/a", "t", 1), input("/b", "t", 2), input("/a", "u", 3)], &[])
            .unwrap();
        source.erase("/b").unwrap();

        for format in [BackupFormat::Json, BackupFormat::JsonZstd] {
            let bytes = source.create_backup().unwrap().encode(format).unwrap();
            let target = Ledger::in_memory();
            assert_eq!(target.restore_backup(Backup::decode(&bytes).unwrap()).unwrap(), 3);

            for id in 1..=3 {
                assert_eq!(target.event(id).unwrap(), source.event(id).unwrap());
            }
            assert!(target.audit(&AuditScope::All).unwrap().valid);
            assert_eq!(target.status().unwrap(), source.status().unwrap());
        }
    }

    #[test]
    fn tampered_backup_is_rejected_whole() {
        let source = ledger_with(4);
        let mut backup = source.create_backup().unwrap();
        backup.events[2].event.content = EventContent::Data(json!({"n": 1000}));

        let target = Ledger::in_memory();
        let err = target.restore_backup(backup).unwrap_err();
        assert!(matches!(err, LedgerError::IntegrityViolation { id: 3, .. }));
        assert_eq!(target.status().unwrap().event_count, 0);
    }

    #[test]
    fn backup_must_start_at_genesis() {
        let source = ledger_with(3);
        let mut backup = source.create_backup().unwrap();
        backup.events.remove(0);
        let err = Ledger::in_memory().restore_backup(backup).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityViolation);
    }

    // -----------------------------------------------------------------------
    // 10. Commits continue after restore
    // -----------------------------------------------------------------------
    #[test]
    fn restored_ledger_accepts_new_commits() {
        let source = ledger_with(2);
        let target = Ledger::in_memory();
        target.restore_backup(source.create_backup().unwrap()).unwrap();

        let events = target.commit(&[input("/s", "t", 3)], &[]).unwrap();
        assert_eq!(events[0].id, 3);
        assert_eq!(events[0].predecessorhash, source.event(2).unwrap().hash);
        assert!(target.audit(&AuditScope::All).unwrap().valid);
    }
}
