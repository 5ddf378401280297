use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lectern_core::{CourseId, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub course_id: CourseId,
    pub date: String,
    pub is_active: bool,
    pub created_at: String,
}

pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the session for (course, date), creating it if absent.
    /// The (course_id, date) pair is unique; a concurrent creator wins the
    /// insert and both callers read the same row back.
    #[instrument(skip(self), fields(course_id = %course_id, date))]
    pub fn get_or_create(
        &self,
        course_id: &CourseId,
        date: &str,
    ) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let id = SessionId::new();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO sessions (id, course_id, date, is_active, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT (course_id, date) DO NOTHING",
                rusqlite::params![id.as_str(), course_id.as_str(), date, now],
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, course_id, date, is_active, created_at
                 FROM sessions WHERE course_id = ?1 AND date = ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![course_id.as_str(), date])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!(
                    "session for course {course_id} on {date}"
                ))),
            }
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub fn get(&self, id: &SessionId) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, course_id, date, is_active, created_at
                 FROM sessions WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    /// Mark a session inactive. Idempotent.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn end(&self, id: &SessionId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET is_active = 0 WHERE id = ?1",
                [id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("session {id}")));
            }
            Ok(())
        })
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, StoreError> {
    Ok(SessionRow {
        id: SessionId::from_raw(row_helpers::get::<String>(row, 0, "sessions", "id")?),
        course_id: CourseId::from_raw(row_helpers::get::<String>(row, 1, "sessions", "course_id")?),
        date: row_helpers::get(row, 2, "sessions", "date")?,
        is_active: row_helpers::get::<i64>(row, 3, "sessions", "is_active")? != 0,
        created_at: row_helpers::get(row, 4, "sessions", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::courses::CourseRepo;

    fn setup() -> (Database, CourseId) {
        let db = Database::in_memory().unwrap();
        let courses = CourseRepo::new(db.clone());
        let course = courses.create("CS101", "Intro", "Prof. Lee", "").unwrap();
        (db, course.id)
    }

    #[test]
    fn get_or_create_creates_once() {
        let (db, course_id) = setup();
        let repo = SessionRepo::new(db);

        let first = repo.get_or_create(&course_id, "2026-03-02").unwrap();
        let second = repo.get_or_create(&course_id, "2026-03-02").unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.is_active);
    }

    #[test]
    fn different_dates_get_different_sessions() {
        let (db, course_id) = setup();
        let repo = SessionRepo::new(db);

        let mon = repo.get_or_create(&course_id, "2026-03-02").unwrap();
        let wed = repo.get_or_create(&course_id, "2026-03-04").unwrap();
        assert_ne!(mon.id, wed.id);
    }

    #[test]
    fn end_marks_inactive() {
        let (db, course_id) = setup();
        let repo = SessionRepo::new(db);
        let session = repo.get_or_create(&course_id, "2026-03-02").unwrap();

        repo.end(&session.id).unwrap();
        let fetched = repo.get(&session.id).unwrap();
        assert!(!fetched.is_active);

        // Ending again is a no-op, not an error
        repo.end(&session.id).unwrap();
    }

    #[test]
    fn end_unknown_session_is_not_found() {
        let (db, _) = setup();
        let repo = SessionRepo::new(db);
        let result = repo.end(&SessionId::from_raw("sess_missing"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn get_unknown_session_fails() {
        let (db, _) = setup();
        let repo = SessionRepo::new(db);
        assert!(repo.get(&SessionId::from_raw("sess_missing")).is_err());
    }
}
