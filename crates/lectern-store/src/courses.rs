use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lectern_core::CourseId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CourseRow {
    pub id: CourseId,
    pub code: String,
    pub name: String,
    pub instructor: String,
    pub time_slot: String,
    pub created_at: String,
}

pub struct CourseRepo {
    db: Database,
}

impl CourseRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a course. The code is unique; a duplicate is a Conflict.
    #[instrument(skip(self), fields(code))]
    pub fn create(
        &self,
        code: &str,
        name: &str,
        instructor: &str,
        time_slot: &str,
    ) -> Result<CourseRow, StoreError> {
        let id = CourseId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO courses (id, code, name, instructor, time_slot, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id.as_str(), code, name, instructor, time_slot, now],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!("course code {code}"))
                }
                other => StoreError::Database(other.to_string()),
            })?;

            Ok(CourseRow {
                id: id.clone(),
                code: code.to_string(),
                name: name.to_string(),
                instructor: instructor.to_string(),
                time_slot: time_slot.to_string(),
                created_at: now.clone(),
            })
        })
    }

    #[instrument(skip(self), fields(code))]
    pub fn get_by_code(&self, code: &str) -> Result<CourseRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, code, name, instructor, time_slot, created_at
                 FROM courses WHERE code = ?1",
            )?;
            let mut rows = stmt.query([code])?;
            match rows.next()? {
                Some(row) => row_to_course(row),
                None => Err(StoreError::NotFound(format!("course {code}"))),
            }
        })
    }

    pub fn get(&self, id: &CourseId) -> Result<CourseRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, code, name, instructor, time_slot, created_at
                 FROM courses WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_course(row),
                None => Err(StoreError::NotFound(format!("course {id}"))),
            }
        })
    }

    pub fn list(&self) -> Result<Vec<CourseRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, code, name, instructor, time_slot, created_at
                 FROM courses ORDER BY code",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_course(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_course(row: &rusqlite::Row<'_>) -> Result<CourseRow, StoreError> {
    Ok(CourseRow {
        id: CourseId::from_raw(row_helpers::get::<String>(row, 0, "courses", "id")?),
        code: row_helpers::get(row, 1, "courses", "code")?,
        name: row_helpers::get(row, 2, "courses", "name")?,
        instructor: row_helpers::get(row, 3, "courses", "instructor")?,
        time_slot: row_helpers::get(row, 4, "courses", "time_slot")?,
        created_at: row_helpers::get(row, 5, "courses", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_by_code() {
        let db = Database::in_memory().unwrap();
        let repo = CourseRepo::new(db);
        let course = repo
            .create("COSE213", "Data Structures", "Prof. Han", "Tue 10:30")
            .unwrap();
        assert!(course.id.as_str().starts_with("course_"));

        let fetched = repo.get_by_code("COSE213").unwrap();
        assert_eq!(fetched.id, course.id);
        assert_eq!(fetched.name, "Data Structures");
    }

    #[test]
    fn duplicate_code_is_conflict() {
        let db = Database::in_memory().unwrap();
        let repo = CourseRepo::new(db);
        repo.create("CS101", "Intro", "Prof. Lee", "").unwrap();
        let result = repo.create("CS101", "Intro again", "Prof. Lee", "");
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn unknown_code_is_not_found() {
        let db = Database::in_memory().unwrap();
        let repo = CourseRepo::new(db);
        assert!(matches!(
            repo.get_by_code("NOPE"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_orders_by_code() {
        let db = Database::in_memory().unwrap();
        let repo = CourseRepo::new(db);
        repo.create("CS201", "B", "p", "").unwrap();
        repo.create("CS101", "A", "p", "").unwrap();
        let all = repo.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].code, "CS101");
    }
}
