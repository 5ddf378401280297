use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use lectern_ai::FallbackAssistant;
use lectern_core::SessionId;
use lectern_store::courses::CourseRepo;
use lectern_store::moments::MomentRepo;
use lectern_store::sessions::SessionRepo;
use lectern_store::Database;

const QUEUE_DEPTH: usize = 256;

/// A queued enrichment request. `raw_note` is the note text captured when
/// the moment was created, not whatever is stored by the time the job
/// runs; the combination logic is defined over the original input.
#[derive(Clone, Debug)]
pub struct EnrichmentJob {
    pub moment_id: i64,
    pub session_id: SessionId,
    pub raw_note: String,
}

/// Submits background enrichment jobs for captured moments and owns the
/// worker draining them. The handler is idempotent (differs-only note
/// write), so re-delivery of a job is harmless.
///
/// The job result is never re-broadcast: the synchronous `important`
/// event already went out with the raw note, and clients refetch to see
/// the enriched value.
#[derive(Clone)]
pub struct EnrichmentDispatcher {
    tx: mpsc::Sender<EnrichmentJob>,
}

impl EnrichmentDispatcher {
    /// Start the worker task and return the dispatcher handle.
    pub fn start(
        db: Database,
        assistant: Arc<FallbackAssistant>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let handle = tokio::spawn(run_worker(rx, db, assistant));
        (Self { tx }, handle)
    }

    /// Queue a job. Failure to enqueue is logged and swallowed; the
    /// moment itself is already persisted and enrichment is best-effort.
    pub async fn submit(&self, job: EnrichmentJob) {
        if let Err(e) = self.tx.send(job).await {
            warn!(error = %e, "enrichment queue closed, dropping job");
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<EnrichmentJob>,
    db: Database,
    assistant: Arc<FallbackAssistant>,
) {
    while let Some(job) = rx.recv().await {
        enrich_moment(&db, &assistant, &job).await;
    }
    info!("enrichment worker stopped");
}

/// Run one enrichment job. Never fails: every error path is logged and
/// leaves the stored note as it was.
#[instrument(skip(db, assistant, job), fields(moment_id = job.moment_id, session_id = %job.session_id))]
pub async fn enrich_moment(db: &Database, assistant: &FallbackAssistant, job: &EnrichmentJob) {
    let moments = MomentRepo::new(db.clone());

    let moment = match moments.get(job.moment_id) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "enrichment target vanished");
            return;
        }
    };

    let Some(capture_url) = moment.capture_url.as_deref() else {
        // Nothing to summarize; the raw note stands.
        return;
    };

    let subject = subject_hint(db, &job.session_id);
    let summary = assistant
        .summarize_or_none(capture_url, subject.as_deref())
        .await;

    let combined = combined_note(&job.raw_note, summary.as_deref());
    match moments.update_note_if_changed(job.moment_id, &combined) {
        Ok(true) => info!(summarized = summary.is_some(), "moment note enriched"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "enrichment note write failed"),
    }
}

/// Course-code hint for the summarization prompt, best effort.
fn subject_hint(db: &Database, session_id: &SessionId) -> Option<String> {
    let session = SessionRepo::new(db.clone()).get(session_id).ok()?;
    let course = CourseRepo::new(db.clone()).get(&session.course_id).ok()?;
    Some(course.code.chars().take(7).collect())
}

/// Combine the raw note with an AI summary: both present joins them with
/// a separator, summary alone replaces an empty note, and a missing
/// summary leaves the raw note untouched.
fn combined_note(raw_note: &str, summary: Option<&str>) -> String {
    match summary {
        Some(summary) if !raw_note.is_empty() => format!("{raw_note} | {summary}"),
        Some(summary) => summary.to_string(),
        None => raw_note.to_string(),
    }
}
