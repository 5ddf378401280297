use std::sync::Arc;

use tracing::instrument;

use lectern_core::{GroupKey, MomentTrigger, SessionEvent, SessionId};
use lectern_store::moments::{MomentRepo, MomentRow};
use lectern_store::sessions::SessionRepo;
use lectern_store::Database;

use crate::enrichment::{EnrichmentDispatcher, EnrichmentJob};
use crate::error::HubError;
use crate::hub::SessionHub;

/// Creates important moments and their broadcasts. The mark-important
/// path also feeds the enrichment queue; the broadcast always carries the
/// raw note, and the enriched note is only visible on refetch.
pub struct MomentService {
    db: Database,
    hub: Arc<SessionHub>,
    enrichment: EnrichmentDispatcher,
}

impl MomentService {
    pub fn new(db: Database, hub: Arc<SessionHub>, enrichment: EnrichmentDispatcher) -> Self {
        Self {
            db,
            hub,
            enrichment,
        }
    }

    fn moments(&self) -> MomentRepo {
        MomentRepo::new(self.db.clone())
    }

    fn active_session(&self, session_id: &SessionId) -> Result<(), HubError> {
        let session = SessionRepo::new(self.db.clone()).get(session_id)?;
        if !session.is_active {
            return Err(HubError::NotFound(format!("session {session_id} has ended")));
        }
        Ok(())
    }

    /// Instructor marks the current slide important. Students hear about
    /// it immediately with the raw note; a capture, when present, queues a
    /// background summary into the stored note.
    #[instrument(skip(self, note), fields(session_id = %session_id))]
    pub async fn mark_important(
        &self,
        session_id: &SessionId,
        note: &str,
        capture_url: Option<&str>,
    ) -> Result<MomentRow, HubError> {
        self.active_session(session_id)?;
        let capture_url = capture_url.map(str::trim).filter(|s| !s.is_empty());

        let moment = self.moments().create(
            session_id,
            MomentTrigger::Manual,
            None,
            note,
            capture_url,
        )?;

        self.hub.registry().broadcast(
            &GroupKey::student(session_id),
            &SessionEvent::Important {
                note: note.to_string(),
                capture_url: capture_url.map(str::to_string),
            },
        );

        if capture_url.is_some() {
            self.enrichment
                .submit(EnrichmentJob {
                    moment_id: moment.id,
                    session_id: session_id.clone(),
                    raw_note: note.to_string(),
                })
                .await;
        }

        Ok(moment)
    }

    /// The client judged the hard-feedback ratio over threshold and sends
    /// a capture of the struggling slide. Both groups are alerted.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn hard_capture(
        &self,
        session_id: &SessionId,
        capture_url: &str,
        hard_ratio: Option<f64>,
    ) -> Result<MomentRow, HubError> {
        self.active_session(session_id)?;
        let capture_url = capture_url.trim();
        if capture_url.is_empty() {
            return Err(HubError::InvalidArgument("capture_url is required".into()));
        }

        let moment = self.moments().create(
            session_id,
            MomentTrigger::Hard,
            None,
            "",
            Some(capture_url),
        )?;

        self.hub.registry().broadcast_many(
            &GroupKey::both(session_id),
            &SessionEvent::HardAlert {
                capture_url: capture_url.to_string(),
                hard_ratio,
            },
        );

        Ok(moment)
    }

    pub fn get(&self, moment_id: i64) -> Result<MomentRow, HubError> {
        Ok(self.moments().get(moment_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupRegistry;
    use crate::presence::LocalPresenceStore;
    use lectern_ai::{FallbackAssistant, MockAssistant};
    use lectern_core::Role;
    use lectern_store::courses::CourseRepo;
    use tokio::sync::mpsc;

    struct Fixture {
        db: Database,
        hub: Arc<SessionHub>,
        session_id: SessionId,
        service: MomentService,
        _worker: tokio::task::JoinHandle<()>,
    }

    fn fixture(mock: MockAssistant) -> Fixture {
        let db = Database::in_memory().unwrap();
        let course = CourseRepo::new(db.clone())
            .create("COSE213", "Data Structures", "Prof. Han", "")
            .unwrap();
        let session = SessionRepo::new(db.clone())
            .get_or_create(&course.id, "2026-03-02")
            .unwrap();
        let registry = Arc::new(GroupRegistry::new(64));
        let hub = Arc::new(SessionHub::new(registry, Arc::new(LocalPresenceStore::new())));
        let assistant = Arc::new(FallbackAssistant::with_defaults(Arc::new(mock)));
        let (dispatcher, worker) = EnrichmentDispatcher::start(db.clone(), assistant);
        let service = MomentService::new(db.clone(), Arc::clone(&hub), dispatcher);
        Fixture {
            db,
            hub,
            session_id: session.id,
            service,
            _worker: worker,
        }
    }

    async fn observers(fx: &Fixture) -> (mpsc::Receiver<String>, mpsc::Receiver<String>) {
        let (_s, mut student_rx) = fx.hub.attach(fx.session_id.clone(), Role::Student).await;
        student_rx.recv().await.unwrap();
        let (_t, mut teacher_rx) = fx.hub.attach(fx.session_id.clone(), Role::Teacher).await;
        teacher_rx.recv().await.unwrap();
        student_rx.recv().await.unwrap();
        (teacher_rx, student_rx)
    }

    #[tokio::test]
    async fn mark_important_broadcasts_raw_note_to_students() {
        let fx = fixture(MockAssistant::new());
        let (mut teacher_rx, mut student_rx) = observers(&fx).await;

        let moment = fx
            .service
            .mark_important(&fx.session_id, "중요", None)
            .await
            .unwrap();
        assert_eq!(moment.note, "중요");

        let evt = student_rx.recv().await.unwrap();
        assert!(evt.contains("\"event\":\"important\""));
        assert!(evt.contains("중요"));
        assert!(teacher_rx.try_recv().is_err());
    }

    /// The enrichment scenario end to end: the broadcast carries the raw
    /// note, the stored note gains the summary, and no second broadcast
    /// is sent.
    #[tokio::test]
    async fn enrichment_updates_store_without_rebroadcast() {
        let fx = fixture(MockAssistant::new().with_summary(Ok("그래프 설명".into())));
        let (_teacher_rx, mut student_rx) = observers(&fx).await;

        let moment = fx
            .service
            .mark_important(&fx.session_id, "중요", Some("captures/9.png"))
            .await
            .unwrap();

        let evt = student_rx.recv().await.unwrap();
        assert!(evt.contains("\"note\":\"중요\""));
        assert!(!evt.contains("그래프 설명"));

        // Wait for the background worker
        let moments = MomentRepo::new(fx.db.clone());
        for _ in 0..100 {
            if moments.get(moment.id).unwrap().note != "중요" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(moments.get(moment.id).unwrap().note, "중요 | 그래프 설명");

        // No re-broadcast of the enriched note
        assert!(student_rx.try_recv().is_err());
        assert_eq!(fx.service.get(moment.id).unwrap().note, "중요 | 그래프 설명");
    }

    #[tokio::test]
    async fn moment_without_capture_skips_enrichment() {
        let fx = fixture(MockAssistant::new().with_summary(Ok("should not run".into())));
        let moment = fx
            .service
            .mark_important(&fx.session_id, "note only", None)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(fx.service.get(moment.id).unwrap().note, "note only");
    }

    #[tokio::test]
    async fn hard_capture_alerts_both_groups() {
        let fx = fixture(MockAssistant::new());
        let (mut teacher_rx, mut student_rx) = observers(&fx).await;

        let moment = fx
            .service
            .hard_capture(&fx.session_id, "captures/hard.png", Some(0.62))
            .await
            .unwrap();
        assert_eq!(moment.trigger, MomentTrigger::Hard);

        let teacher_evt = teacher_rx.recv().await.unwrap();
        assert!(teacher_evt.contains("\"event\":\"hard_alert\""));
        assert!(teacher_evt.contains("captures/hard.png"));
        let student_evt = student_rx.recv().await.unwrap();
        assert!(student_evt.contains("hard_alert"));
    }

    #[tokio::test]
    async fn hard_capture_requires_a_capture() {
        let fx = fixture(MockAssistant::new());
        let result = fx.service.hard_capture(&fx.session_id, " ", None).await;
        assert!(matches!(result, Err(HubError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn ended_session_rejects_moments() {
        let fx = fixture(MockAssistant::new());
        SessionRepo::new(fx.db.clone()).end(&fx.session_id).unwrap();
        let result = fx.service.mark_important(&fx.session_id, "n", None).await;
        assert!(matches!(result, Err(HubError::NotFound(_))));
    }
}
