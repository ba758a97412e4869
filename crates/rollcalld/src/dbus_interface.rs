//! D-Bus interface for the attendance daemon.
//!
//! Bus name: org.rollcall.Attendance1
//! Object path: /org/rollcall/Attendance1
//!
//! Structured payloads travel as JSON strings. Optional string arguments
//! use "" for "absent"; `at_ms = 0` means "now". Ingest never returns an
//! error to the caller: a dropped event is logged and, in strict mode,
//! surfaced as an `UnknownStudent` signal for the display layer.

use crate::engine::{EngineError, EngineHandle};
use chrono::{DateTime, TimeZone, Utc};
use rollcall_core::enroll::EnrollmentRequest;
use rollcall_core::projector::StatusFilter;
use rollcall_core::types::{Angle, PresenceEvent};
use rollcall_core::Admission;
use std::collections::HashMap;
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

pub struct AttendanceService {
    engine: EngineHandle,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn event_time(at_ms: i64) -> Option<DateTime<Utc>> {
    if at_ms <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(at_ms).single()
}

fn internal(err: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Ingest one recognized-identity event from the external recognizer.
    ///
    /// Fire-and-forget: duplicates and empty ids are dropped, unknown ids
    /// in strict mode are dropped with a warning. A successful check-in
    /// emits the `CheckedIn` signal.
    async fn push_presence(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
        id: String,
        name: String,
        email: String,
        avatar: String,
        status: String,
        at_ms: i64,
    ) -> zbus::fdo::Result<()> {
        let event = PresenceEvent {
            id,
            name: non_empty(name),
            email: non_empty(email),
            avatar: non_empty(avatar),
            // An unrecognized status string degrades to "present" rather
            // than rejecting the sighting.
            status: status.parse().unwrap_or_default(),
            at: event_time(at_ms),
        };

        match self.engine.push(event).await.map_err(internal)? {
            Admission::CheckedIn(record) => {
                tracing::info!(
                    student_id = %record.student_id,
                    name = %record.name,
                    status = %record.status,
                    "checked in"
                );
                // Signal failures never bounce back to the recognizer;
                // the check-in itself is already recorded.
                if let Err(e) = Self::checked_in(
                    &emitter,
                    &record.student_id,
                    &record.name,
                    record.status.as_str(),
                    record.arrived_at.timestamp_millis(),
                )
                .await
                {
                    tracing::warn!(error = %e, "CheckedIn signal emission failed");
                }
            }
            Admission::AlreadyPresent => {
                tracing::debug!("re-sighting of checked-in student ignored");
            }
            Admission::Unknown(student_id) => {
                tracing::warn!(student_id = %student_id, "unknown student (ignored)");
                if let Err(e) = Self::unknown_student(&emitter, &student_id).await {
                    tracing::warn!(error = %e, "UnknownStudent signal emission failed");
                }
            }
            Admission::MissingId => {
                tracing::debug!("presence event without id discarded");
            }
        }
        Ok(())
    }

    /// Enroll a student: identity fields plus one image part per angle
    /// (front, left, right, up, down). An empty byte array counts as a
    /// missing part. Returns the submission response as JSON.
    #[allow(clippy::too_many_arguments)]
    async fn register(
        &self,
        full_name: String,
        student_id: String,
        school_email: String,
        face_front: Vec<u8>,
        face_left: Vec<u8>,
        face_right: Vec<u8>,
        face_up: Vec<u8>,
        face_down: Vec<u8>,
    ) -> zbus::fdo::Result<String> {
        let mut images = HashMap::new();
        let parts = [
            (Angle::Front, face_front),
            (Angle::Left, face_left),
            (Angle::Right, face_right),
            (Angle::Up, face_up),
            (Angle::Down, face_down),
        ];
        for (angle, bytes) in parts {
            if !bytes.is_empty() {
                images.insert(angle, bytes);
            }
        }

        let request = EnrollmentRequest {
            full_name,
            student_id,
            school_email,
            images,
        };

        let reply = match self.engine.enroll(request).await.map_err(internal)? {
            Ok(student_id) => serde_json::json!({ "ok": true, "student_id": student_id }),
            Err(err) => {
                tracing::warn!(error = %err, class = err.class(), "enrollment rejected");
                serde_json::json!({
                    "ok": false,
                    "message": err.to_string(),
                    "error_class": err.class(),
                })
            }
        };
        Ok(reply.to_string())
    }

    /// All enrolled students with their capture records, newest first. JSON.
    async fn list_students(&self) -> zbus::fdo::Result<String> {
        let reply = match self.engine.list_students().await.map_err(internal)? {
            Ok(students) => serde_json::json!({ "ok": true, "data": students }),
            Err(err) => {
                tracing::error!(error = %err, "listing query failed");
                serde_json::json!({ "ok": false, "message": "server error" })
            }
        };
        Ok(reply.to_string())
    }

    /// One enrolled student by id, or `ok:false` when absent. JSON.
    async fn get_student(&self, student_id: String) -> zbus::fdo::Result<String> {
        let reply = match self.engine.get_student(student_id).await.map_err(internal)? {
            Ok(Some(student)) => serde_json::json!({ "ok": true, "data": student }),
            Ok(None) => serde_json::json!({ "ok": false, "message": "not found" }),
            Err(err) => {
                tracing::error!(error = %err, "student query failed");
                serde_json::json!({ "ok": false, "message": "server error" })
            }
        };
        Ok(reply.to_string())
    }

    /// Live view: check-ins filtered by free-text query and status
    /// ("all", "present", "late"), ordered by arrival, plus counts. JSON.
    async fn project(&self, query: String, status: String) -> zbus::fdo::Result<String> {
        let filter: StatusFilter = status
            .parse()
            .map_err(|e: rollcall_core::types::ParseEnumError| {
                zbus::fdo::Error::InvalidArgs(e.to_string())
            })?;
        let view = self.engine.project(query, filter).await.map_err(internal)?;
        serde_json::to_string(&view)
            .map_err(|e| zbus::fdo::Error::Failed(format!("encode failed: {e}")))
    }

    /// Daemon status information. JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let stats = self.engine.stats().await.map_err(internal)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "auto_enroll": stats.auto_enroll,
            "total": stats.total,
            "present": stats.present,
        })
        .to_string())
    }

    /// Emitted once per session when a student checks in.
    #[zbus(signal)]
    async fn checked_in(
        emitter: &SignalEmitter<'_>,
        student_id: &str,
        name: &str,
        status: &str,
        at_ms: i64,
    ) -> zbus::Result<()>;

    /// Emitted in strict mode when a recognized id is not in the roster.
    #[zbus(signal)]
    async fn unknown_student(emitter: &SignalEmitter<'_>, student_id: &str) -> zbus::Result<()>;
}
