use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lectern_core::{DeviceId, FeedbackKind, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackRow {
    pub id: i64,
    pub session_id: SessionId,
    pub device_id: DeviceId,
    pub kind: FeedbackKind,
    pub created_at: String,
}

/// Per-session OK/HARD totals.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct FeedbackTotals {
    pub ok: i64,
    pub hard: i64,
}

pub struct FeedbackRepo {
    db: Database,
}

impl FeedbackRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(session_id = %session_id, device_id = %device_id, kind = %kind))]
    pub fn create(
        &self,
        session_id: &SessionId,
        device_id: &DeviceId,
        kind: FeedbackKind,
    ) -> Result<FeedbackRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO feedback_events (session_id, device_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![session_id.as_str(), device_id.as_str(), kind.to_string(), now],
            )?;
            Ok(FeedbackRow {
                id: conn.last_insert_rowid(),
                session_id: session_id.clone(),
                device_id: device_id.clone(),
                kind,
                created_at: now.clone(),
            })
        })
    }

    /// Timestamp of the most recent event from this device in this
    /// session. The rate-limit check compares against it.
    #[instrument(skip(self), fields(session_id = %session_id, device_id = %device_id))]
    pub fn last_created_at(
        &self,
        session_id: &SessionId,
        device_id: &DeviceId,
    ) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT created_at FROM feedback_events
                 WHERE session_id = ?1 AND device_id = ?2
                 ORDER BY created_at DESC, id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(rusqlite::params![session_id.as_str(), device_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_helpers::get(row, 0, "feedback_events", "created_at")?)),
                None => Ok(None),
            }
        })
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn totals(&self, session_id: &SessionId) -> Result<FeedbackTotals, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, COUNT(*) FROM feedback_events
                 WHERE session_id = ?1 GROUP BY kind",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut totals = FeedbackTotals::default();
            while let Some(row) = rows.next()? {
                let kind: String = row_helpers::get(row, 0, "feedback_events", "kind")?;
                let count: i64 = row_helpers::get(row, 1, "feedback_events", "count")?;
                match kind.as_str() {
                    "OK" => totals.ok = count,
                    "HARD" => totals.hard = count,
                    other => {
                        return Err(StoreError::CorruptRow {
                            table: "feedback_events",
                            column: "kind",
                            detail: format!("unknown variant: {other}"),
                        })
                    }
                }
            }
            Ok(totals)
        })
    }

}
