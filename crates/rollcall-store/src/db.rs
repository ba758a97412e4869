//! SQLite student directory.
//!
//! One `tokio-rusqlite` connection; callers queue work onto its single
//! worker, so statement execution is serialized. Uniqueness of student id
//! and school email is enforced by the schema, which backs the enrollment
//! conflict check even if a second process shares the database file.

use chrono::{DateTime, Utc};
use rollcall_core::types::{Angle, FaceImage, RosterEntry, Student};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS students (
    student_id   TEXT PRIMARY KEY,
    full_name    TEXT NOT NULL,
    school_email TEXT NOT NULL UNIQUE,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS face_images (
    id         TEXT PRIMARY KEY,
    student_id TEXT NOT NULL REFERENCES students(student_id) ON DELETE CASCADE,
    angle      TEXT NOT NULL,
    file_path  TEXT NOT NULL,
    embedding  TEXT,
    UNIQUE (student_id, angle)
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the underlying failure is a UNIQUE/constraint rejection —
    /// the storage-layer signal for a duplicate identity.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(tokio_rusqlite::Error::Rusqlite(
                rusqlite::Error::SqliteFailure(e, _),
            )) if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// A directory listing entry: the student plus all stored capture records.
#[derive(Debug, Clone, Serialize)]
pub struct StudentWithImages {
    #[serde(flatten)]
    pub student: Student,
    pub face_images: Vec<FaceImage>,
}

/// Handle to the attendance database.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database file and apply the schema.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// In-memory database, used by tests and throwaway sessions.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Does any student already use this id or email?
    pub async fn identity_exists(
        &self,
        student_id: &str,
        school_email: &str,
    ) -> Result<bool, StoreError> {
        let student_id = student_id.to_string();
        let school_email = school_email.to_string();
        let count: i64 = self
            .conn
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM students WHERE student_id = ?1 OR school_email = ?2",
                    params![student_id, school_email],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count > 0)
    }

    /// Insert a student and their five capture records in one transaction.
    ///
    /// Either every row lands or none does. A concurrent writer losing the
    /// uniqueness race gets a constraint rejection
    /// (`StoreError::is_unique_violation`) and the winner is unaffected.
    pub async fn insert_enrollment(
        &self,
        student: Student,
        images: Vec<FaceImage>,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO students (student_id, full_name, school_email, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        student.id,
                        student.full_name,
                        student.school_email,
                        student.created_at.to_rfc3339(),
                    ],
                )?;
                for image in &images {
                    tx.execute(
                        "INSERT INTO face_images (id, student_id, angle, file_path, embedding)
                         VALUES (?1, ?2, ?3, ?4, NULL)",
                        params![
                            image.id,
                            image.student_id,
                            image.angle.as_str(),
                            image.file_path,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All enrolled students with their capture records, newest first.
    pub async fn list_students(&self) -> Result<Vec<StudentWithImages>, StoreError> {
        let students = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT student_id, full_name, school_email, created_at
                     FROM students ORDER BY created_at DESC, student_id DESC",
                )?;
                let students = stmt
                    .query_map([], map_student)?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut out = Vec::with_capacity(students.len());
                for student in students {
                    let face_images = images_for(conn, &student.id)?;
                    out.push(StudentWithImages {
                        student,
                        face_images,
                    });
                }
                Ok(out)
            })
            .await?;
        Ok(students)
    }

    /// One student by id, with capture records.
    pub async fn get_student(
        &self,
        student_id: &str,
    ) -> Result<Option<StudentWithImages>, StoreError> {
        let student_id = student_id.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let student = conn
                    .query_row(
                        "SELECT student_id, full_name, school_email, created_at
                         FROM students WHERE student_id = ?1",
                        params![student_id],
                        map_student,
                    )
                    .optional()?;
                match student {
                    Some(student) => {
                        let face_images = images_for(conn, &student.id)?;
                        Ok(Some(StudentWithImages {
                            student,
                            face_images,
                        }))
                    }
                    None => Ok(None),
                }
            })
            .await?;
        Ok(found)
    }

    /// Roster entries for every durably enrolled student, used to seed the
    /// session roster at daemon startup.
    pub async fn roster_entries(&self) -> Result<Vec<RosterEntry>, StoreError> {
        let entries = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT student_id, full_name, school_email FROM students")?;
                let entries = stmt
                    .query_map([], |row| {
                        Ok(RosterEntry {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            email: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    /// Attach an externally computed embedding to a capture record.
    /// Returns false if no record has that id.
    pub async fn set_embedding(
        &self,
        image_id: &str,
        values: &[f32],
    ) -> Result<bool, StoreError> {
        let image_id = image_id.to_string();
        let encoded = serde_json::to_string(values)?;
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE face_images SET embedding = ?1 WHERE id = ?2",
                    params![encoded, image_id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }
}

fn map_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    let raw: String = row.get(3)?;
    let created_at = raw.parse::<DateTime<Utc>>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Student {
        id: row.get(0)?,
        full_name: row.get(1)?,
        school_email: row.get(2)?,
        created_at,
    })
}

fn images_for(
    conn: &rusqlite::Connection,
    student_id: &str,
) -> Result<Vec<FaceImage>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, angle, file_path, embedding
         FROM face_images WHERE student_id = ?1 ORDER BY rowid",
    )?;
    let images = stmt
        .query_map(params![student_id], |row| {
            let raw_angle: String = row.get(2)?;
            let angle = raw_angle.parse::<Angle>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            let embedding: Option<String> = row.get(4)?;
            Ok(FaceImage {
                id: row.get(0)?,
                student_id: row.get(1)?,
                angle,
                file_path: row.get(3)?,
                embedding: embedding.and_then(|raw| serde_json::from_str(&raw).ok()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn student(id: &str, email: &str, day: u32) -> Student {
        Student {
            id: id.into(),
            full_name: format!("Student {id}"),
            school_email: email.into(),
            created_at: Utc.with_ymd_and_hms(2025, 9, day, 9, 0, 0).unwrap(),
        }
    }

    fn images(student_id: &str) -> Vec<FaceImage> {
        Angle::ALL
            .iter()
            .map(|angle| FaceImage {
                id: Uuid::new_v4().to_string(),
                student_id: student_id.into(),
                angle: *angle,
                file_path: format!("captures/{student_id}/{angle}.jpg"),
                embedding: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_enrollment(student("S1", "s1@x.edu", 1), images("S1"))
            .await
            .unwrap();

        let found = db.get_student("S1").await.unwrap().unwrap();
        assert_eq!(found.student.full_name, "Student S1");
        assert_eq!(found.face_images.len(), 5);
        assert!(found.face_images.iter().all(|i| i.embedding.is_none()));

        assert!(db.get_student("S2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_exists_matches_id_or_email() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_enrollment(student("S1", "s1@x.edu", 1), images("S1"))
            .await
            .unwrap();

        assert!(db.identity_exists("S1", "other@x.edu").await.unwrap());
        assert!(db.identity_exists("S9", "s1@x.edu").await.unwrap());
        assert!(!db.identity_exists("S9", "s9@x.edu").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_constraint_violation() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_enrollment(student("S1", "s1@x.edu", 1), images("S1"))
            .await
            .unwrap();

        let err = db
            .insert_enrollment(student("S1", "elsewhere@x.edu", 2), images("S1"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // The losing commit must not have touched the original row.
        let kept = db.get_student("S1").await.unwrap().unwrap();
        assert_eq!(kept.student.school_email, "s1@x.edu");
        assert_eq!(kept.face_images.len(), 5);
    }

    #[tokio::test]
    async fn test_list_students_newest_first() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_enrollment(student("S1", "s1@x.edu", 1), images("S1"))
            .await
            .unwrap();
        db.insert_enrollment(student("S2", "s2@x.edu", 3), images("S2"))
            .await
            .unwrap();
        db.insert_enrollment(student("S3", "s3@x.edu", 2), images("S3"))
            .await
            .unwrap();

        let listed = db.list_students().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.student.id.as_str()).collect();
        assert_eq!(ids, ["S2", "S3", "S1"]);
    }

    #[tokio::test]
    async fn test_roster_entries_cover_all_students() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_enrollment(student("S1", "s1@x.edu", 1), images("S1"))
            .await
            .unwrap();
        db.insert_enrollment(student("S2", "s2@x.edu", 2), images("S2"))
            .await
            .unwrap();

        let mut ids: Vec<_> = db
            .roster_entries()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        ids.sort();
        assert_eq!(ids, ["S1", "S2"]);
    }

    #[tokio::test]
    async fn test_set_embedding() {
        let db = Database::open_in_memory().await.unwrap();
        let imgs = images("S1");
        let target = imgs[0].id.clone();
        db.insert_enrollment(student("S1", "s1@x.edu", 1), imgs)
            .await
            .unwrap();

        assert!(db.set_embedding(&target, &[0.25, -0.5, 1.0]).await.unwrap());
        assert!(!db.set_embedding("no-such-id", &[1.0]).await.unwrap());

        let found = db.get_student("S1").await.unwrap().unwrap();
        let image = found.face_images.iter().find(|i| i.id == target).unwrap();
        assert_eq!(image.embedding.as_deref(), Some(&[0.25, -0.5, 1.0][..]));
    }
}
