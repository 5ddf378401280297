use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use lectern_core::{AssistError, Assistant};

/// Generic apology returned when the answering collaborator fails or times
/// out. Clients never see the underlying error.
pub const ANSWER_FALLBACK: &str =
    "Sorry, the teaching assistant could not produce an answer right now. Please try again in a moment.";

/// Per-call timeout budget for the collaborator calls.
#[derive(Clone, Debug)]
pub struct FallbackConfig {
    pub clean_timeout: Duration,
    pub answer_timeout: Duration,
    pub summary_timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            // clean/answer sit on interactive request paths
            clean_timeout: Duration::from_secs(15),
            answer_timeout: Duration::from_secs(30),
            // summaries run on the background enrichment path
            summary_timeout: Duration::from_secs(60),
        }
    }
}

/// Wraps an Assistant with bounded timeouts and the safe-default policy:
/// cleaning falls back to the original text, answering to a generic
/// apology, summarization to no summary. This is the only layer that
/// observes `AssistError`; callers get infallible values.
pub struct FallbackAssistant {
    inner: Arc<dyn Assistant>,
    config: FallbackConfig,
}

impl FallbackAssistant {
    pub fn new(inner: Arc<dyn Assistant>, config: FallbackConfig) -> Self {
        Self { inner, config }
    }

    pub fn with_defaults(inner: Arc<dyn Assistant>) -> Self {
        Self::new(inner, FallbackConfig::default())
    }

    async fn call(
        &self,
        op: &'static str,
        budget: Duration,
        fut: impl std::future::Future<Output = Result<String, AssistError>>,
    ) -> Result<String, AssistError> {
        match timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(AssistError::Timeout(budget)),
        }
        .map_err(|e| {
            warn!(
                provider = self.inner.name(),
                op,
                error_kind = e.error_kind(),
                error = %e,
                "assistant call failed, using fallback"
            );
            e
        })
    }

    /// Cleaned question, or the trimmed original when the collaborator
    /// fails, times out, or returns nothing.
    pub async fn clean_or_original(
        &self,
        text: &str,
        capture: Option<&str>,
        subject: Option<&str>,
    ) -> String {
        let result = self
            .call(
                "clean",
                self.config.clean_timeout,
                self.inner.clean(text, capture, subject),
            )
            .await;
        match result {
            Ok(cleaned) if !cleaned.trim().is_empty() => cleaned.trim().to_string(),
            _ => text.trim().to_string(),
        }
    }

    /// Answer text, or the generic apology line.
    pub async fn answer_or_apology(
        &self,
        text: &str,
        capture: Option<&str>,
        subject: Option<&str>,
    ) -> String {
        let result = self
            .call(
                "answer",
                self.config.answer_timeout,
                self.inner.answer(text, capture, subject),
            )
            .await;
        match result {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            _ => ANSWER_FALLBACK.to_string(),
        }
    }

    /// One-line capture summary, or None on failure/timeout/empty output.
    pub async fn summarize_or_none(
        &self,
        capture: &str,
        subject: Option<&str>,
    ) -> Option<String> {
        let result = self
            .call(
                "summarize",
                self.config.summary_timeout,
                self.inner.summarize_capture(capture, subject),
            )
            .await;
        match result {
            Ok(summary) => {
                let trimmed = summary.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAssistant;

    fn wrapped(mock: MockAssistant) -> FallbackAssistant {
        FallbackAssistant::with_defaults(Arc::new(mock))
    }

    #[tokio::test]
    async fn clean_passes_through_success() {
        let assistant = wrapped(MockAssistant::new().with_clean(Ok("What is a stack?".into())));
        let cleaned = assistant.clean_or_original("what is a stak?", None, None).await;
        assert_eq!(cleaned, "What is a stack?");
    }

    #[tokio::test]
    async fn clean_falls_back_to_original_on_error() {
        let assistant = wrapped(MockAssistant::new().with_clean(Err(AssistError::Upstream {
            status: 503,
            body: "overloaded".into(),
        })));
        let cleaned = assistant.clean_or_original("  what is a stak?  ", None, None).await;
        assert_eq!(cleaned, "what is a stak?");
    }

    #[tokio::test]
    async fn clean_falls_back_on_blank_completion() {
        let assistant = wrapped(MockAssistant::new().with_clean(Ok("   ".into())));
        let cleaned = assistant.clean_or_original("original", None, None).await;
        assert_eq!(cleaned, "original");
    }

    #[tokio::test]
    async fn answer_falls_back_to_apology() {
        let assistant = wrapped(
            MockAssistant::new().with_answer(Err(AssistError::Network("refused".into()))),
        );
        let answer = assistant.answer_or_apology("q", None, None).await;
        assert_eq!(answer, ANSWER_FALLBACK);
    }

    #[tokio::test]
    async fn summary_errors_become_none() {
        let assistant = wrapped(MockAssistant::new().with_summary(Err(AssistError::EmptyCompletion)));
        assert!(assistant.summarize_or_none("c", None).await.is_none());
    }

    #[tokio::test]
    async fn empty_summary_becomes_none() {
        let assistant = wrapped(MockAssistant::new().with_summary(Ok("  ".into())));
        assert!(assistant.summarize_or_none("c", None).await.is_none());
    }

    #[tokio::test]
    async fn timeout_triggers_fallback() {
        let mock = MockAssistant::new()
            .with_answer(Ok("too late".into()))
            .with_delay(Duration::from_millis(200));
        let config = FallbackConfig {
            answer_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let assistant = FallbackAssistant::new(Arc::new(mock), config);
        let answer = assistant.answer_or_apology("q", None, None).await;
        assert_eq!(answer, ANSWER_FALLBACK);
    }

    #[tokio::test]
    async fn successful_summary_is_trimmed() {
        let assistant = wrapped(MockAssistant::new().with_summary(Ok("  그래프 설명  ".into())));
        assert_eq!(
            assistant.summarize_or_none("c", None).await.as_deref(),
            Some("그래프 설명")
        );
    }
}
