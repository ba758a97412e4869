//! rollcall-core — Classroom attendance domain logic.
//!
//! Roster reconciliation, de-duplicated check-in, auto-enrollment policy,
//! live-view projection, and enrollment validation. Pure and synchronous:
//! persistence and transport live in `rollcall-store` and `rollcalld`.

pub mod enroll;
pub mod ledger;
pub mod projector;
pub mod roster;
pub mod types;

pub use ledger::{Admission, CheckinLedger, EnrollPolicy, PresenceEngine};
pub use roster::Roster;
pub use types::{
    Angle, FaceImage, PresenceEvent, PresenceRecord, PresenceStatus, RosterEntry, Student,
};
