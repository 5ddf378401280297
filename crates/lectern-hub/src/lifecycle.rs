use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::instrument;

use lectern_ai::FallbackAssistant;
use lectern_core::{
    DeviceId, FeedbackKind, GroupKey, MomentTrigger, QuestionStatus, SessionEvent, SessionId,
};
use lectern_store::courses::CourseRepo;
use lectern_store::feedback::{FeedbackRepo, FeedbackRow};
use lectern_store::moments::{MomentRepo, MomentRow};
use lectern_store::questions::{QuestionRepo, QuestionRow};
use lectern_store::sessions::{SessionRepo, SessionRow};
use lectern_store::Database;

use crate::error::HubError;
use crate::hub::SessionHub;

/// Minimum gap between feedback pulses from one device in one session.
pub const FEEDBACK_DEBOUNCE: Duration = Duration::from_secs(3);

/// Result of a like action. A repeat like is silent: `newly_liked` is
/// false and no broadcast went out.
#[derive(Clone, Copy, Debug)]
pub struct LikeOutcome {
    pub newly_liked: bool,
    pub like_count: i64,
}

/// Enforces the question state machine and sequences each transition's
/// side effects: the persistence write always completes before the
/// corresponding broadcast is sent, so a client reading persisted state on
/// receipt of an event never sees something older than the event implied.
pub struct QuestionLifecycle {
    db: Database,
    hub: Arc<SessionHub>,
    assistant: Arc<FallbackAssistant>,
}

impl QuestionLifecycle {
    pub fn new(db: Database, hub: Arc<SessionHub>, assistant: Arc<FallbackAssistant>) -> Self {
        Self { db, hub, assistant }
    }

    fn questions(&self) -> QuestionRepo {
        QuestionRepo::new(self.db.clone())
    }

    fn moments(&self) -> MomentRepo {
        MomentRepo::new(self.db.clone())
    }

    fn feedback(&self) -> FeedbackRepo {
        FeedbackRepo::new(self.db.clone())
    }

    /// Session lookup that also requires the session to still be active.
    fn active_session(&self, session_id: &SessionId) -> Result<SessionRow, HubError> {
        let session = SessionRepo::new(self.db.clone()).get(session_id)?;
        if !session.is_active {
            return Err(HubError::NotFound(format!("session {session_id} has ended")));
        }
        Ok(session)
    }

    /// Course-code hint for the collaborator prompts, best effort.
    fn subject_hint(&self, session_id: &SessionId) -> Option<String> {
        let session = SessionRepo::new(self.db.clone()).get(session_id).ok()?;
        let course = CourseRepo::new(self.db.clone()).get(&session.course_id).ok()?;
        Some(course.code.chars().take(7).collect())
    }

    fn check_owner(question: &QuestionRow, device_id: &DeviceId) -> Result<(), HubError> {
        if &question.device_id != device_id {
            return Err(HubError::Unauthorized(format!(
                "device does not own question {}",
                question.id
            )));
        }
        Ok(())
    }

    fn check_no_regression(
        question: &QuestionRow,
        next: QuestionStatus,
    ) -> Result<(), HubError> {
        if question.status.would_regress(next) {
            return Err(HubError::InvalidArgument(format!(
                "question {} is already {}",
                question.id, question.status
            )));
        }
        Ok(())
    }

    /// A student pressed "ask": create the question shell and tell the
    /// instructor side a question is coming.
    #[instrument(skip(self), fields(session_id = %session_id, device_id = %device_id))]
    pub async fn start_intent(
        &self,
        session_id: &SessionId,
        device_id: &DeviceId,
    ) -> Result<QuestionRow, HubError> {
        self.active_session(session_id)?;
        let question = self.questions().create_intent(session_id, device_id)?;

        self.hub.registry().broadcast(
            &GroupKey::teacher(session_id),
            &SessionEvent::QuestionIntent {
                question_id: question.id,
                created_at: question.created_at.clone(),
            },
        );

        Ok(question)
    }

    /// Register a slide capture for a question and show it to the student
    /// side. The capture itself lives in external storage; only its
    /// reference is recorded here.
    #[instrument(skip(self), fields(question_id))]
    pub async fn register_capture(
        &self,
        question_id: i64,
        capture_url: &str,
    ) -> Result<MomentRow, HubError> {
        let capture_url = capture_url.trim();
        if capture_url.is_empty() {
            return Err(HubError::InvalidArgument("capture_url is required".into()));
        }
        let question = self.questions().get(question_id)?;

        let moment = self.moments().create(
            &question.session_id,
            MomentTrigger::Question,
            Some(question.id),
            "",
            Some(capture_url),
        )?;

        self.hub.registry().broadcast(
            &GroupKey::student(&question.session_id),
            &SessionEvent::QuestionCapture {
                question_id: question.id,
                capture_url: capture_url.to_string(),
            },
        );

        Ok(moment)
    }

    /// The owning device submits its question text; the cleaning
    /// collaborator runs synchronously. No broadcast until forwarded.
    #[instrument(skip(self, original_text), fields(question_id, device_id = %device_id))]
    pub async fn submit_text(
        &self,
        question_id: i64,
        device_id: &DeviceId,
        original_text: &str,
    ) -> Result<QuestionRow, HubError> {
        if original_text.trim().is_empty() {
            return Err(HubError::InvalidArgument("original_text is required".into()));
        }

        let question = self.questions().get(question_id)?;
        Self::check_owner(&question, device_id)?;
        Self::check_no_regression(&question, QuestionStatus::TextSubmitted)?;

        let capture = self.moments().latest_capture_for_question(question_id)?;
        let subject = self.subject_hint(&question.session_id);
        let cleaned = self
            .assistant
            .clean_or_original(original_text, capture.as_deref(), subject.as_deref())
            .await;

        self.questions().record_text(question_id, original_text, &cleaned)?;
        Ok(self.questions().get(question_id)?)
    }

    /// The owning device asks for an AI answer, optionally overriding the
    /// cleaned text it wants answered. Works straight from the intent
    /// state too, answering off the original text.
    #[instrument(skip(self, override_cleaned), fields(question_id, device_id = %device_id))]
    pub async fn request_answer(
        &self,
        question_id: i64,
        device_id: &DeviceId,
        override_cleaned: Option<&str>,
    ) -> Result<QuestionRow, HubError> {
        let question = self.questions().get(question_id)?;
        Self::check_owner(&question, device_id)?;
        Self::check_no_regression(&question, QuestionStatus::AiAnswered)?;

        let chosen = match override_cleaned.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => text.to_string(),
            None => match question.cleaned_text.as_deref().filter(|s| !s.is_empty()) {
                Some(cleaned) => cleaned.to_string(),
                None => question.original_text.clone(),
            },
        };

        let capture = self.moments().latest_capture_for_question(question_id)?;
        let subject = self.subject_hint(&question.session_id);
        let answer = self
            .assistant
            .answer_or_apology(&chosen, capture.as_deref(), subject.as_deref())
            .await;

        self.questions().record_answer(question_id, &chosen, &answer)?;
        Ok(self.questions().get(question_id)?)
    }

    /// Forward the question to the instructor. Terminal and idempotent at
    /// the message level: forwarding again re-sends the broadcast. Any
    /// actor may forward; ownership is not re-checked here.
    #[instrument(skip(self), fields(question_id))]
    pub async fn forward(&self, question_id: i64) -> Result<QuestionRow, HubError> {
        self.questions().get(question_id)?;
        self.questions().mark_forwarded(question_id)?;
        let question = self.questions().get(question_id)?;

        let capture = self.moments().latest_capture_for_question(question_id)?;
        self.hub.registry().broadcast_many(
            &GroupKey::both(&question.session_id),
            &SessionEvent::NewQuestion {
                question_id: question.id,
                text: question.display_text().to_string(),
                ai_answer: question.ai_answer.clone(),
                capture_url: capture,
                created_at: question.updated_at.clone(),
            },
        );

        Ok(question)
    }

    /// Like a question from a device. Only a newly created like row
    /// broadcasts the updated count; a repeat is a silent no-op.
    #[instrument(skip(self), fields(question_id, device_id = %device_id))]
    pub async fn like(
        &self,
        question_id: i64,
        device_id: &DeviceId,
    ) -> Result<LikeOutcome, HubError> {
        let question = self.questions().get(question_id)?;

        let newly_liked = self.questions().like(question_id, device_id)?;
        let like_count = self.questions().like_count(question_id)?;

        if newly_liked {
            self.hub.registry().broadcast_many(
                &GroupKey::both(&question.session_id),
                &SessionEvent::QuestionLikeUpdate {
                    question_id,
                    like_count,
                },
            );
        }

        Ok(LikeOutcome {
            newly_liked,
            like_count,
        })
    }

    /// Record a feedback pulse, debounced per (session, device), and tell
    /// the instructor side.
    #[instrument(skip(self), fields(session_id = %session_id, device_id = %device_id, kind = %kind))]
    pub async fn submit_feedback(
        &self,
        session_id: &SessionId,
        device_id: &DeviceId,
        kind: FeedbackKind,
    ) -> Result<FeedbackRow, HubError> {
        self.active_session(session_id)?;

        if let Some(last) = self.feedback().last_created_at(session_id, device_id)? {
            if within_debounce(&last, Utc::now()) {
                return Err(HubError::RateLimited);
            }
        }

        let event = self.feedback().create(session_id, device_id, kind)?;

        self.hub.registry().broadcast(
            &GroupKey::teacher(session_id),
            &SessionEvent::Feedback {
                feedback_kind: kind,
                created_at: event.created_at.clone(),
            },
        );

        Ok(event)
    }

    pub fn list_questions(
        &self,
        session_id: &SessionId,
        forwarded_only: bool,
    ) -> Result<Vec<QuestionRow>, HubError> {
        SessionRepo::new(self.db.clone()).get(session_id)?;
        Ok(self.questions().list_for_session(session_id, forwarded_only)?)
    }
}

/// Whether `last` (RFC3339) is less than the debounce window before `now`.
/// An unparseable timestamp counts as outside the window.
fn within_debounce(last: &str, now: DateTime<Utc>) -> bool {
    let Ok(last) = DateTime::parse_from_rfc3339(last) else {
        return false;
    };
    let elapsed = now.signed_duration_since(last.with_timezone(&Utc));
    elapsed < chrono::Duration::from_std(FEEDBACK_DEBOUNCE).unwrap_or_default()
}
