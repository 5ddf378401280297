use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lectern_core::{DeviceId, QuestionStatus, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionRow {
    pub id: i64,
    pub session_id: SessionId,
    pub device_id: DeviceId,
    pub original_text: String,
    pub cleaned_text: Option<String>,
    pub ai_answer: Option<String>,
    pub forwarded: bool,
    pub status: QuestionStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl QuestionRow {
    /// Text shown to the instructor: cleaned when available, else original.
    pub fn display_text(&self) -> &str {
        match self.cleaned_text.as_deref() {
            Some(cleaned) if !cleaned.is_empty() => cleaned,
            _ => &self.original_text,
        }
    }
}

pub struct QuestionRepo {
    db: Database,
}

const SELECT_COLS: &str = "SELECT id, session_id, device_id, original_text, cleaned_text,
        ai_answer, forwarded, status, created_at, updated_at FROM questions";

impl QuestionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a question in the intent state with empty text.
    #[instrument(skip(self), fields(session_id = %session_id, device_id = %device_id))]
    pub fn create_intent(
        &self,
        session_id: &SessionId,
        device_id: &DeviceId,
    ) -> Result<QuestionRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO questions (session_id, device_id, original_text, status, created_at, updated_at)
                 VALUES (?1, ?2, '', 'intent', ?3, ?3)",
                rusqlite::params![session_id.as_str(), device_id.as_str(), now],
            )?;
            let id = conn.last_insert_rowid();

            Ok(QuestionRow {
                id,
                session_id: session_id.clone(),
                device_id: device_id.clone(),
                original_text: String::new(),
                cleaned_text: None,
                ai_answer: None,
                forwarded: false,
                status: QuestionStatus::Intent,
                created_at: now.clone(),
                updated_at: now.clone(),
            })
        })
    }

    #[instrument(skip(self), fields(question_id = id))]
    pub fn get(&self, id: i64) -> Result<QuestionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => row_to_question(row),
                None => Err(StoreError::NotFound(format!("question {id}"))),
            }
        })
    }

    /// Store the submitted original text plus its cleaned form.
    #[instrument(skip(self, original_text, cleaned_text), fields(question_id = id))]
    pub fn record_text(
        &self,
        id: i64,
        original_text: &str,
        cleaned_text: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE questions SET original_text = ?1, cleaned_text = ?2,
                        status = 'text_submitted', updated_at = ?3 WHERE id = ?4",
                rusqlite::params![original_text, cleaned_text, now, id],
            )?;
            Ok(())
        })
    }

    /// Store the (possibly overridden) cleaned text and the AI answer.
    #[instrument(skip(self, cleaned_text, ai_answer), fields(question_id = id))]
    pub fn record_answer(
        &self,
        id: i64,
        cleaned_text: &str,
        ai_answer: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE questions SET cleaned_text = ?1, ai_answer = ?2,
                        status = 'ai_answered', updated_at = ?3 WHERE id = ?4",
                rusqlite::params![cleaned_text, ai_answer, now, id],
            )?;
            Ok(())
        })
    }

    /// Set the forwarded flag and terminal status. Idempotent.
    #[instrument(skip(self), fields(question_id = id))]
    pub fn mark_forwarded(&self, id: i64) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE questions SET forwarded = 1, status = 'forwarded', updated_at = ?1
                 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
            Ok(())
        })
    }

    /// Record a like for (question, device). Returns true only when the
    /// like row was newly created; a duplicate is a silent no-op.
    #[instrument(skip(self), fields(question_id = id, device_id = %device_id))]
    pub fn like(&self, id: i64, device_id: &DeviceId) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO question_likes (question_id, device_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![id, device_id.as_str(), now],
            )?;
            Ok(conn.changes() > 0)
        })
    }

    #[instrument(skip(self), fields(question_id = id))]
    pub fn like_count(&self, id: i64) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM question_likes WHERE question_id = ?1",
                [id],
                |row| row.get(0),
            )
            .map_err(StoreError::from)
        })
    }

    /// Questions of a session in creation order, optionally only those
    /// already forwarded to the instructor.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn list_for_session(
        &self,
        session_id: &SessionId,
        forwarded_only: bool,
    ) -> Result<Vec<QuestionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = if forwarded_only {
                format!("{SELECT_COLS} WHERE session_id = ?1 AND forwarded = 1 ORDER BY created_at, id")
            } else {
                format!("{SELECT_COLS} WHERE session_id = ?1 ORDER BY created_at, id")
            };
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_question(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn count_for_session(&self, session_id: &SessionId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM questions WHERE session_id = ?1",
                [session_id.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)
        })
    }
}

fn row_to_question(row: &rusqlite::Row<'_>) -> Result<QuestionRow, StoreError> {
    let status_str: String = row_helpers::get(row, 7, "questions", "status")?;

    Ok(QuestionRow {
        id: row_helpers::get(row, 0, "questions", "id")?,
        session_id: SessionId::from_raw(row_helpers::get::<String>(row, 1, "questions", "session_id")?),
        device_id: DeviceId::from_raw(row_helpers::get::<String>(row, 2, "questions", "device_id")?),
        original_text: row_helpers::get(row, 3, "questions", "original_text")?,
        cleaned_text: row_helpers::get_opt(row, 4, "questions", "cleaned_text")?,
        ai_answer: row_helpers::get_opt(row, 5, "questions", "ai_answer")?,
        forwarded: row_helpers::get::<i64>(row, 6, "questions", "forwarded")? != 0,
        status: row_helpers::parse_enum(&status_str, "questions", "status")?,
        created_at: row_helpers::get(row, 8, "questions", "created_at")?,
        updated_at: row_helpers::get(row, 9, "questions", "updated_at")?,
    })
}
