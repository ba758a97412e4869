//! Enrollment transaction manager.
//!
//! Validates a submission in contract order (identity fields, email
//! policy, duplicate identity, capture set) and commits student + capture
//! rows in one SQLite transaction. Capture bytes are written under a
//! per-student directory before the transaction; any commit failure
//! removes them again, so no observable state survives a failed
//! enrollment. The daemon serializes calls through its engine task; the
//! schema's UNIQUE constraints reject the loser if a second process races
//! the same identity.

use crate::db::{Database, StoreError};
use chrono::Utc;
use rollcall_core::enroll::{
    sanitize_student_id, validate_captures, validate_identity, EmailPolicy, EnrollmentRequest,
    ValidationError,
};
use rollcall_core::types::{FaceImage, Student};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Enrollment failure, classed for the submission response.
#[derive(Debug, Error)]
pub enum EnrollError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("student id or school email already enrolled")]
    DuplicateIdentity,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EnrollError {
    /// Error class reported to the submission surface.
    pub fn class(&self) -> &'static str {
        match self {
            EnrollError::Validation(_) => "validation",
            EnrollError::DuplicateIdentity => "conflict",
            EnrollError::Storage(_) => "server",
        }
    }
}

/// Validates and atomically commits enrollments.
pub struct EnrollmentManager {
    db: Database,
    captures_dir: PathBuf,
    email_policy: EmailPolicy,
}

impl EnrollmentManager {
    pub fn new(db: Database, captures_dir: PathBuf, email_policy: EmailPolicy) -> Self {
        Self {
            db,
            captures_dir,
            email_policy,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Enroll one student with their five capture images.
    ///
    /// Returns the student id on success. On any failure nothing is
    /// persisted, so the caller may safely resubmit the whole request.
    pub async fn enroll(&self, request: EnrollmentRequest) -> Result<String, EnrollError> {
        validate_identity(&request, &self.email_policy)?;

        if self
            .db
            .identity_exists(&request.student_id, &request.school_email)
            .await?
        {
            return Err(EnrollError::DuplicateIdentity);
        }

        let captures = validate_captures(&request.images)?;

        // Write capture files, then commit the rows. A crash in between
        // leaves files without records — invisible to every query, and
        // overwritten by the next successful enrollment of this id.
        let dir_name = sanitize_student_id(&request.student_id);
        let student_dir = self.captures_dir.join(&dir_name);
        tokio::fs::create_dir_all(&student_dir)
            .await
            .map_err(StoreError::from)?;

        let mut images = Vec::with_capacity(captures.len());
        for capture in &captures {
            let file_name = format!("{}.{}", capture.angle.as_str(), capture.extension);
            let path = student_dir.join(&file_name);
            let bytes = &request.images[&capture.angle];
            if let Err(e) = tokio::fs::write(&path, bytes).await {
                self.discard_captures(&student_dir).await;
                return Err(StoreError::from(e).into());
            }
            images.push(FaceImage {
                id: Uuid::new_v4().to_string(),
                student_id: request.student_id.clone(),
                angle: capture.angle,
                file_path: path.to_string_lossy().into_owned(),
                embedding: None,
            });
        }

        let student = Student {
            id: request.student_id.clone(),
            full_name: request.full_name.clone(),
            school_email: request.school_email.clone(),
            created_at: Utc::now(),
        };

        match self.db.insert_enrollment(student, images).await {
            Ok(()) => {
                tracing::info!(
                    student_id = %request.student_id,
                    dir = %student_dir.display(),
                    "enrollment committed"
                );
                Ok(request.student_id)
            }
            Err(e) => {
                self.discard_captures(&student_dir).await;
                if e.is_unique_violation() {
                    Err(EnrollError::DuplicateIdentity)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Best-effort removal of a failed enrollment's capture directory.
    async fn discard_captures(&self, dir: &std::path::Path) {
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove capture directory");
        }
    }
}
