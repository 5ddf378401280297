use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use lectern_core::SessionId;
use lectern_store::courses::{CourseRepo, CourseRow};
use lectern_store::feedback::{FeedbackRepo, FeedbackTotals};
use lectern_store::moments::{MomentRepo, MomentRow};
use lectern_store::questions::QuestionRepo;
use lectern_store::sessions::{SessionRepo, SessionRow};
use lectern_store::Database;

use crate::error::HubError;
use crate::hub::SessionHub;

/// Session-scoped commands: daily get-or-create, ending a session, and
/// the after-class summary.
pub struct SessionService {
    db: Database,
    hub: Arc<SessionHub>,
}

/// Aggregated view of a finished (or running) session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub date: String,
    pub course: CourseSummary,
    pub feedback: FeedbackTotals,
    pub question_count: i64,
    pub important_moments: Vec<MomentRow>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CourseSummary {
    pub code: String,
    pub name: String,
    pub instructor: String,
}

impl SessionService {
    pub fn new(db: Database, hub: Arc<SessionHub>) -> Self {
        Self { db, hub }
    }

    fn sessions(&self) -> SessionRepo {
        SessionRepo::new(self.db.clone())
    }

    /// Today's session for a course code, created on first access. Both
    /// roles call this when joining class.
    #[instrument(skip(self), fields(course_code, date))]
    pub fn today_session(
        &self,
        course_code: &str,
        date: &str,
    ) -> Result<(CourseRow, SessionRow), HubError> {
        let course = CourseRepo::new(self.db.clone()).get_by_code(course_code)?;
        let session = self.sessions().get_or_create(&course.id, date)?;
        Ok((course, session))
    }

    pub fn get(&self, session_id: &SessionId) -> Result<SessionRow, HubError> {
        Ok(self.sessions().get(session_id)?)
    }

    /// End a session: persist the inactive flag first, then broadcast
    /// `session_ended` and close every attached connection.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn end_session(&self, session_id: &SessionId) -> Result<usize, HubError> {
        self.sessions().end(session_id)?;
        Ok(self.hub.end_session(session_id).await)
    }

    /// The after-class rollup: feedback totals, question count and the
    /// important moments in order, with enriched notes when the
    /// background job has landed.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn summary(&self, session_id: &SessionId) -> Result<SessionSummary, HubError> {
        let session = self.sessions().get(session_id)?;
        let course = CourseRepo::new(self.db.clone()).get(&session.course_id)?;

        let feedback = FeedbackRepo::new(self.db.clone()).totals(session_id)?;
        let question_count = QuestionRepo::new(self.db.clone()).count_for_session(session_id)?;
        let important_moments = MomentRepo::new(self.db.clone()).list_for_session(session_id)?;

        Ok(SessionSummary {
            session_id: session.id,
            date: session.date,
            course: CourseSummary {
                code: course.code,
                name: course.name,
                instructor: course.instructor,
            },
            feedback,
            question_count,
            important_moments,
        })
    }
}
