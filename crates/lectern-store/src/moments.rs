use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lectern_core::{MomentTrigger, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MomentRow {
    pub id: i64,
    pub session_id: SessionId,
    pub trigger: MomentTrigger,
    pub question_id: Option<i64>,
    pub note: String,
    pub capture_url: Option<String>,
    pub created_at: String,
}

pub struct MomentRepo {
    db: Database,
}

const SELECT_COLS: &str = "SELECT id, session_id, trigger_kind, question_id, note, capture_url,
        created_at FROM important_moments";

impl MomentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, note), fields(session_id = %session_id, trigger = %trigger))]
    pub fn create(
        &self,
        session_id: &SessionId,
        trigger: MomentTrigger,
        question_id: Option<i64>,
        note: &str,
        capture_url: Option<&str>,
    ) -> Result<MomentRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO important_moments (session_id, trigger_kind, question_id, note, capture_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    session_id.as_str(),
                    trigger.to_string(),
                    question_id,
                    note,
                    capture_url,
                    now
                ],
            )?;
            Ok(MomentRow {
                id: conn.last_insert_rowid(),
                session_id: session_id.clone(),
                trigger,
                question_id,
                note: note.to_string(),
                capture_url: capture_url.map(str::to_string),
                created_at: now.clone(),
            })
        })
    }

    #[instrument(skip(self), fields(moment_id = id))]
    pub fn get(&self, id: i64) -> Result<MomentRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => row_to_moment(row),
                None => Err(StoreError::NotFound(format!("moment {id}"))),
            }
        })
    }

    /// Write a new note only when it differs from the stored one. Returns
    /// whether a write happened; re-running with the same note is a no-op,
    /// which keeps the enrichment handler idempotent.
    #[instrument(skip(self, note), fields(moment_id = id))]
    pub fn update_note_if_changed(&self, id: i64, note: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE important_moments SET note = ?1 WHERE id = ?2 AND note <> ?1",
                rusqlite::params![note, id],
            )?;
            Ok(conn.changes() > 0)
        })
    }

    /// Most recent capture registered for a question, if any.
    #[instrument(skip(self), fields(question_id))]
    pub fn latest_capture_for_question(
        &self,
        question_id: i64,
    ) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT capture_url FROM important_moments
                 WHERE question_id = ?1 AND trigger_kind = 'QUESTION' AND capture_url IS NOT NULL
                 ORDER BY created_at DESC, id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([question_id])?;
            match rows.next()? {
                Some(row) => Ok(row_helpers::get_opt(row, 0, "important_moments", "capture_url")?),
                None => Ok(None),
            }
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn list_for_session(&self, session_id: &SessionId) -> Result<Vec<MomentRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("{SELECT_COLS} WHERE session_id = ?1 ORDER BY created_at, id"))?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_moment(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_moment(row: &rusqlite::Row<'_>) -> Result<MomentRow, StoreError> {
    let trigger_str: String = row_helpers::get(row, 2, "important_moments", "trigger_kind")?;

    Ok(MomentRow {
        id: row_helpers::get(row, 0, "important_moments", "id")?,
        session_id: SessionId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "important_moments",
            "session_id",
        )?),
        trigger: row_helpers::parse_enum(&trigger_str, "important_moments", "trigger_kind")?,
        question_id: row_helpers::get_opt(row, 3, "important_moments", "question_id")?,
        note: row_helpers::get(row, 4, "important_moments", "note")?,
        capture_url: row_helpers::get_opt(row, 5, "important_moments", "capture_url")?,
        created_at: row_helpers::get(row, 6, "important_moments", "created_at")?,
    })
}
