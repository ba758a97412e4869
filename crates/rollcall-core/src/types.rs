use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the five canonical face-capture poses required for enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Angle {
    Front,
    Left,
    Right,
    Up,
    Down,
}

impl Angle {
    /// All five angles, in submission-field order.
    pub const ALL: [Angle; 5] = [
        Angle::Front,
        Angle::Left,
        Angle::Right,
        Angle::Up,
        Angle::Down,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Angle::Front => "front",
            Angle::Left => "left",
            Angle::Right => "right",
            Angle::Up => "up",
            Angle::Down => "down",
        }
    }

    /// The submission field carrying this angle's image part (e.g., "face_front").
    pub fn field_name(&self) -> &'static str {
        match self {
            Angle::Front => "face_front",
            Angle::Left => "face_left",
            Angle::Right => "face_right",
            Angle::Up => "face_up",
            Angle::Down => "face_down",
        }
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Angle {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(Angle::Front),
            "left" => Ok(Angle::Left),
            "right" => Ok(Angle::Right),
            "up" => Ok(Angle::Up),
            "down" => Ok(Angle::Down),
            other => Err(ParseEnumError::new("angle", other)),
        }
    }
}

/// Check-in status asserted by the caller. Never inferred: there is no
/// automatic present-to-late transition anywhere in the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Present,
    Late,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Present => "present",
            PresenceStatus::Late => "late",
        }
    }

    /// Label shown on the presence chip in a display surface.
    pub fn chip_label(&self) -> &'static str {
        match self {
            PresenceStatus::Present => "Present",
            PresenceStatus::Late => "Late",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(PresenceStatus::Present),
            "late" => Ok(PresenceStatus::Late),
            other => Err(ParseEnumError::new("presence status", other)),
        }
    }
}

/// Failed parse of one of the closed string enums at an ingest boundary.
#[derive(Debug, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// An enrolled student. Identity is immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    /// Externally assigned unique id (e.g., "23BI1001").
    pub id: String,
    pub full_name: String,
    pub school_email: String,
    pub created_at: DateTime<Utc>,
}

/// One stored capture image. A student has exactly one per angle,
/// all five present, or none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceImage {
    pub id: String,
    pub student_id: String,
    pub angle: Angle,
    pub file_path: String,
    /// Populated later by the external embedding pipeline; always unset
    /// at enrollment time.
    pub embedding: Option<Vec<f32>>,
}

/// A known identity in the session roster — pre-seeded, durably enrolled,
/// or synthesized by auto-enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A recognized-identity event arriving from the external recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub status: PresenceStatus,
    /// Arrival time; `None` means "now" at admission.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

impl PresenceEvent {
    /// Minimal event carrying only an id, as the recognizer sends when it
    /// has no directory metadata for the face.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            avatar: None,
            status: PresenceStatus::Present,
            at: None,
        }
    }
}

/// One check-in for the current session. Keyed by student id; at most one
/// per student, first arrival wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub status: PresenceStatus,
    pub arrived_at: DateTime<Utc>,
    pub avatar: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_roundtrip() {
        for angle in Angle::ALL {
            assert_eq!(angle.as_str().parse::<Angle>().unwrap(), angle);
        }
    }

    #[test]
    fn test_angle_field_names() {
        assert_eq!(Angle::Front.field_name(), "face_front");
        assert_eq!(Angle::Down.field_name(), "face_down");
    }

    #[test]
    fn test_angle_rejects_unknown() {
        assert!("sideways".parse::<Angle>().is_err());
    }

    #[test]
    fn test_status_default_is_present() {
        assert_eq!(PresenceStatus::default(), PresenceStatus::Present);
    }

    #[test]
    fn test_status_chip_labels() {
        assert_eq!(PresenceStatus::Present.chip_label(), "Present");
        assert_eq!(PresenceStatus::Late.chip_label(), "Late");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("late".parse::<PresenceStatus>().unwrap(), PresenceStatus::Late);
        assert!("absent".parse::<PresenceStatus>().is_err());
    }
}
