//! Roster seed file — optional TOML list of known students loaded at
//! startup, for classes whose roster exists before anyone has enrolled.
//!
//! ```toml
//! [[student]]
//! id = "23BI1001"
//! name = "Nguyen Van A"
//! email = "a23bi1001@usth.edu.vn"
//! ```

use anyhow::Context;
use rollcall_core::types::RosterEntry;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default, rename = "student")]
    students: Vec<SeedStudent>,
}

#[derive(Debug, Deserialize)]
struct SeedStudent {
    id: String,
    name: String,
    #[serde(default)]
    email: String,
}

/// Parse the seed file into roster entries. Entries without an id are
/// skipped with a warning rather than failing startup.
pub fn load_roster_seed(path: &Path) -> anyhow::Result<Vec<RosterEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading roster seed {}", path.display()))?;
    let file: SeedFile = toml::from_str(&raw)
        .with_context(|| format!("parsing roster seed {}", path.display()))?;

    let mut entries = Vec::with_capacity(file.students.len());
    for student in file.students {
        if student.id.is_empty() {
            tracing::warn!(name = %student.name, "seed entry without id skipped");
            continue;
        }
        entries.push(RosterEntry {
            id: student.id,
            name: student.name,
            email: student.email,
        });
    }
    Ok(entries)
}
