use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use lectern_core::{AssistError, Assistant};

type Scripted = Result<String, AssistError>;

/// Pre-programmed responses wrapped around sensible defaults, for
/// deterministic testing without API calls.
///
/// Each method pops from its own queue; an empty queue falls back to the
/// offline behavior (trimmed clean, canned answer, empty summary) so tests
/// only script the calls they care about.
#[derive(Default)]
pub struct MockAssistant {
    cleans: Mutex<VecDeque<Scripted>>,
    answers: Mutex<VecDeque<Scripted>>,
    summaries: Mutex<VecDeque<Scripted>>,
    delay: Option<Duration>,
    clean_calls: AtomicUsize,
    answer_calls: AtomicUsize,
    summary_calls: AtomicUsize,
}

pub const MOCK_ANSWER: &str = "Mock answer: the concept is explained here.";

impl MockAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clean(self, result: Scripted) -> Self {
        self.cleans.lock().push_back(result);
        self
    }

    pub fn with_answer(self, result: Scripted) -> Self {
        self.answers.lock().push_back(result);
        self
    }

    pub fn with_summary(self, result: Scripted) -> Self {
        self.summaries.lock().push_back(result);
        self
    }

    /// Sleep this long before every response, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn clean_calls(&self) -> usize {
        self.clean_calls.load(Ordering::Relaxed)
    }

    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::Relaxed)
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::Relaxed)
    }

    async fn respond(&self, scripted: Option<Scripted>, default: String) -> Scripted {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        scripted.unwrap_or(Ok(default))
    }
}

#[async_trait]
impl Assistant for MockAssistant {
    fn name(&self) -> &str {
        "mock"
    }

    async fn clean(
        &self,
        text: &str,
        _capture: Option<&str>,
        _subject: Option<&str>,
    ) -> Result<String, AssistError> {
        self.clean_calls.fetch_add(1, Ordering::Relaxed);
        let scripted = self.cleans.lock().pop_front();
        self.respond(scripted, text.trim().to_string()).await
    }

    async fn answer(
        &self,
        _text: &str,
        _capture: Option<&str>,
        _subject: Option<&str>,
    ) -> Result<String, AssistError> {
        self.answer_calls.fetch_add(1, Ordering::Relaxed);
        let scripted = self.answers.lock().pop_front();
        self.respond(scripted, MOCK_ANSWER.to_string()).await
    }

    async fn summarize_capture(
        &self,
        _capture: &str,
        _subject: Option<&str>,
    ) -> Result<String, AssistError> {
        self.summary_calls.fetch_add(1, Ordering::Relaxed);
        let scripted = self.summaries.lock().pop_front();
        self.respond(scripted, String::new()).await
    }
}
