//! Live view projection — a pure filter/sort over the check-in ledger.

use crate::ledger::CheckinLedger;
use crate::types::{ParseEnumError, PresenceRecord, PresenceStatus};
use serde::Serialize;
use std::str::FromStr;

/// Status facet of the live filter surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Present,
    Late,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Present => "present",
            StatusFilter::Late => "late",
        }
    }

    fn matches(&self, status: PresenceStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Present => status == PresenceStatus::Present,
            StatusFilter::Late => status == PresenceStatus::Late,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(StatusFilter::All),
            "present" => Ok(StatusFilter::Present),
            "late" => Ok(StatusFilter::Late),
            other => Err(ParseEnumError::new("status filter", other)),
        }
    }
}

/// Filter and order the ledger for display.
///
/// The query matches case-insensitively as a substring of name, id, or
/// email; an empty query matches everything. Output is ordered by arrival
/// time ascending, student id as a deterministic tiebreak. Recomputed in
/// full per call — the ledger is classroom-sized.
pub fn project(ledger: &CheckinLedger, query: &str, filter: StatusFilter) -> Vec<PresenceRecord> {
    let needle = query.trim().to_lowercase();

    let mut rows: Vec<PresenceRecord> = ledger
        .records()
        .filter(|record| {
            let matches_query = needle.is_empty()
                || record.name.to_lowercase().contains(&needle)
                || record.student_id.to_lowercase().contains(&needle)
                || record.email.to_lowercase().contains(&needle);
            matches_query && filter.matches(record.status)
        })
        .cloned()
        .collect();

    rows.sort_by(|a, b| {
        a.arrived_at
            .cmp(&b.arrived_at)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
    rows
}

/// A projected view plus the aggregate counts shown above the list.
#[derive(Debug, Clone, Serialize)]
pub struct LiveView {
    /// `|roster|` — everyone the session knows about.
    pub total: usize,
    /// `|ledger|` — check-ins so far, before filtering.
    pub present: usize,
    pub records: Vec<PresenceRecord>,
}
