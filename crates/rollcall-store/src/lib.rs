//! rollcall-store — Durable persistence for the attendance service.
//!
//! SQLite (via `tokio-rusqlite`) holds the student directory and capture
//! records; capture images live on disk, one directory per student. The
//! enrollment transaction manager ties both together with all-or-nothing
//! semantics.

pub mod db;
pub mod enrollment;

pub use db::{Database, StoreError, StudentWithImages};
pub use enrollment::{EnrollError, EnrollmentManager};
