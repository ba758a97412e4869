//! Session roster — the canonical set of known student identities.

use crate::types::RosterEntry;
use std::collections::HashMap;

/// Keyed directory of known students. Size is monotonically non-decreasing
/// within a session: entries are only ever added or updated, never removed.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: HashMap<String, RosterEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from pre-seeded entries. Later duplicates of an id
    /// replace earlier ones.
    pub fn seeded(entries: impl IntoIterator<Item = RosterEntry>) -> Self {
        let mut roster = Self::new();
        for entry in entries {
            roster.upsert(entry);
        }
        roster
    }

    pub fn lookup(&self, id: &str) -> Option<&RosterEntry> {
        self.entries.get(id)
    }

    pub fn upsert(&mut self, entry: RosterEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str) -> RosterEntry {
        RosterEntry {
            id: id.into(),
            name: name.into(),
            email: format!("{id}@example.edu"),
        }
    }

    #[test]
    fn test_lookup_after_upsert() {
        let mut roster = Roster::new();
        roster.upsert(entry("S1", "Alice"));
        assert_eq!(roster.lookup("S1").unwrap().name, "Alice");
        assert!(roster.lookup("S2").is_none());
    }

    #[test]
    fn test_upsert_same_id_does_not_grow() {
        let mut roster = Roster::seeded([entry("S1", "Alice")]);
        assert_eq!(roster.len(), 1);
        roster.upsert(entry("S1", "Alice A."));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.lookup("S1").unwrap().name, "Alice A.");
    }

    #[test]
    fn test_seeded_roster_size() {
        let roster = Roster::seeded([entry("S1", "Alice"), entry("S2", "Bob")]);
        assert_eq!(roster.len(), 2);
    }
}
