//! Presence ledger and recognition ingest.
//!
//! `PresenceEngine::push` is the single admission point for recognized
//! identity events: roster reconciliation, the auto-enrollment policy, and
//! check-in de-duplication all happen here, one event at a time. Callers
//! that need concurrent ingest serialize through one engine value (the
//! daemon wraps it in a single-consumer task).

use crate::roster::Roster;
use crate::types::{PresenceEvent, PresenceRecord, RosterEntry};
use chrono::Utc;
use std::collections::HashMap;

/// Policy for events whose id is not in the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollPolicy {
    /// Synthesize a roster entry on the fly; the roster grows by one.
    AutoEnroll,
    /// Discard the event and surface an unknown-student notification.
    /// Keeps `present <= total`.
    Strict,
}

/// Check-in records for the current session, keyed by student id.
#[derive(Debug, Clone, Default)]
pub struct CheckinLedger {
    records: HashMap<String, PresenceRecord>,
}

impl CheckinLedger {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PresenceRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PresenceRecord> {
        self.records.values()
    }

    fn insert(&mut self, record: PresenceRecord) {
        self.records.insert(record.student_id.clone(), record);
    }
}

/// Outcome of admitting one presence event. Consumed by the notification
/// layer; only `CheckedIn` mutates the ledger.
#[derive(Debug, Clone)]
pub enum Admission {
    /// A new check-in was recorded.
    CheckedIn(PresenceRecord),
    /// The student already checked in this session; the event is a no-op
    /// and the existing record is untouched.
    AlreadyPresent,
    /// Strict mode: the id is not in the roster and the event was dropped.
    Unknown(String),
    /// The event carried no id and was discarded silently.
    MissingId,
}

/// Roster + ledger + policy behind one admission point.
#[derive(Debug)]
pub struct PresenceEngine {
    roster: Roster,
    ledger: CheckinLedger,
    policy: EnrollPolicy,
}

impl PresenceEngine {
    pub fn new(roster: Roster, policy: EnrollPolicy) -> Self {
        Self {
            roster,
            ledger: CheckinLedger::default(),
            policy,
        }
    }

    /// Admit one recognized-identity event.
    ///
    /// Every PresenceRecord's id exists in the roster by the time the
    /// record is created: under `AutoEnroll` the roster entry is
    /// synthesized first, under `Strict` the event is dropped instead.
    /// First arrival wins; re-sighting an already-present student is a
    /// no-op. The caller's status is taken verbatim.
    pub fn push(&mut self, event: PresenceEvent) -> Admission {
        if event.id.is_empty() {
            return Admission::MissingId;
        }

        if self.roster.lookup(&event.id).is_none() {
            match self.policy {
                EnrollPolicy::AutoEnroll => {
                    tracing::debug!(student_id = %event.id, "auto-enrolling unknown id into roster");
                    self.roster.upsert(RosterEntry {
                        id: event.id.clone(),
                        name: event.name.clone().unwrap_or_else(|| event.id.clone()),
                        email: event.email.clone().unwrap_or_default(),
                    });
                }
                EnrollPolicy::Strict => return Admission::Unknown(event.id),
            }
        }

        if self.ledger.contains(&event.id) {
            return Admission::AlreadyPresent;
        }

        // Fill name/email from the roster entry when the recognizer sent none.
        let base = match self.roster.lookup(&event.id) {
            Some(entry) => entry,
            None => return Admission::Unknown(event.id),
        };
        let record = PresenceRecord {
            student_id: event.id.clone(),
            name: event.name.unwrap_or_else(|| base.name.clone()),
            email: event.email.unwrap_or_else(|| base.email.clone()),
            status: event.status,
            arrived_at: event.at.unwrap_or_else(Utc::now),
            avatar: event.avatar,
        };
        self.ledger.insert(record.clone());
        Admission::CheckedIn(record)
    }

    /// Add a durably enrolled student to the session roster.
    pub fn upsert_roster(&mut self, entry: RosterEntry) {
        self.roster.upsert(entry);
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn ledger(&self) -> &CheckinLedger {
        &self.ledger
    }

    pub fn policy(&self) -> EnrollPolicy {
        self.policy
    }

    /// `total` for the live view: every id the session knows about.
    pub fn total(&self) -> usize {
        self.roster.len()
    }

    /// `present` for the live view: check-ins so far.
    pub fn present_count(&self) -> usize {
        self.ledger.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PresenceStatus;
    use chrono::TimeZone;

    fn seeded_engine(policy: EnrollPolicy) -> PresenceEngine {
        let roster = Roster::seeded([RosterEntry {
            id: "S1".into(),
            name: "Alice".into(),
            email: "alice@x.edu".into(),
        }]);
        PresenceEngine::new(roster, policy)
    }

    #[test]
    fn test_auto_enroll_grows_roster() {
        // Roster starts empty; one push enrolls and checks in.
        let mut engine = PresenceEngine::new(Roster::new(), EnrollPolicy::AutoEnroll);
        let admission = engine.push(PresenceEvent::bare("S1"));
        assert!(matches!(admission, Admission::CheckedIn(_)));
        assert_eq!(engine.total(), 1);
        assert_eq!(engine.present_count(), 1);
    }

    #[test]
    fn test_auto_enroll_defaults_name_to_id() {
        let mut engine = PresenceEngine::new(Roster::new(), EnrollPolicy::AutoEnroll);
        match engine.push(PresenceEvent::bare("S1")) {
            Admission::CheckedIn(record) => {
                assert_eq!(record.name, "S1");
                assert_eq!(record.email, "");
            }
            other => panic!("expected check-in, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_mode_drops_unknown() {
        let mut engine = seeded_engine(EnrollPolicy::Strict);
        let admission = engine.push(PresenceEvent::bare("S2"));
        assert!(matches!(admission, Admission::Unknown(id) if id == "S2"));
        assert_eq!(engine.present_count(), 0);
        assert_eq!(engine.total(), 1, "strict mode must not grow the roster");
    }

    #[test]
    fn test_strict_mode_present_never_exceeds_total() {
        let mut engine = seeded_engine(EnrollPolicy::Strict);
        for id in ["S1", "S2", "S3", "S1"] {
            engine.push(PresenceEvent::bare(id));
            assert!(engine.present_count() <= engine.total());
        }
        assert_eq!(engine.present_count(), 1);
    }

    #[test]
    fn test_push_is_idempotent_per_id() {
        let mut engine = seeded_engine(EnrollPolicy::Strict);
        let first_at = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap();

        let mut event = PresenceEvent::bare("S1");
        event.at = Some(first_at);
        assert!(matches!(engine.push(event), Admission::CheckedIn(_)));

        // Re-sighting with different metadata must not touch the record.
        let mut resight = PresenceEvent::bare("S1");
        resight.status = PresenceStatus::Late;
        resight.name = Some("Imposter".into());
        assert!(matches!(engine.push(resight), Admission::AlreadyPresent));

        assert_eq!(engine.present_count(), 1);
        let record = engine.ledger().get("S1").unwrap();
        assert_eq!(record.arrived_at, first_at);
        assert_eq!(record.status, PresenceStatus::Present);
        assert_eq!(record.name, "Alice");
    }

    #[test]
    fn test_empty_id_discarded_silently() {
        let mut engine = seeded_engine(EnrollPolicy::AutoEnroll);
        assert!(matches!(engine.push(PresenceEvent::bare("")), Admission::MissingId));
        assert_eq!(engine.present_count(), 0);
        assert_eq!(engine.total(), 1);
    }

    #[test]
    fn test_name_email_resolved_from_roster() {
        let mut engine = seeded_engine(EnrollPolicy::Strict);
        match engine.push(PresenceEvent::bare("S1")) {
            Admission::CheckedIn(record) => {
                assert_eq!(record.name, "Alice");
                assert_eq!(record.email, "alice@x.edu");
            }
            other => panic!("expected check-in, got {other:?}"),
        }
    }

    #[test]
    fn test_caller_metadata_wins_over_roster() {
        let mut engine = seeded_engine(EnrollPolicy::Strict);
        let mut event = PresenceEvent::bare("S1");
        event.name = Some("Alice B.".into());
        match engine.push(event) {
            Admission::CheckedIn(record) => {
                assert_eq!(record.name, "Alice B.");
                assert_eq!(record.email, "alice@x.edu");
            }
            other => panic!("expected check-in, got {other:?}"),
        }
    }

    #[test]
    fn test_status_taken_verbatim() {
        // No automatic present-to-late transition in either direction.
        let mut engine = seeded_engine(EnrollPolicy::Strict);
        let mut event = PresenceEvent::bare("S1");
        event.status = PresenceStatus::Late;
        match engine.push(event) {
            Admission::CheckedIn(record) => assert_eq!(record.status, PresenceStatus::Late),
            other => panic!("expected check-in, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_enroll_total_counts_distinct_ids() {
        let mut engine = PresenceEngine::new(Roster::new(), EnrollPolicy::AutoEnroll);
        for id in ["S1", "S2", "S1", "S3", "S2"] {
            engine.push(PresenceEvent::bare(id));
        }
        assert_eq!(engine.total(), 3);
        assert_eq!(engine.present_count(), 3);
    }
}
