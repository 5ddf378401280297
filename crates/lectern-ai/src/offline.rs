use async_trait::async_trait;

use lectern_core::{AssistError, Assistant};

/// No-network Assistant used when no API key is configured: cleaning trims
/// the text, answering returns a fixed line, summarization stays silent.
pub struct OfflineAssistant;

const OFFLINE_ANSWER: &str =
    "The assistant is running offline; no generated answer is available for this question yet.";

#[async_trait]
impl Assistant for OfflineAssistant {
    fn name(&self) -> &str {
        "offline"
    }

    async fn clean(
        &self,
        text: &str,
        _capture: Option<&str>,
        _subject: Option<&str>,
    ) -> Result<String, AssistError> {
        Ok(text.trim().to_string())
    }

    async fn answer(
        &self,
        _text: &str,
        _capture: Option<&str>,
        _subject: Option<&str>,
    ) -> Result<String, AssistError> {
        Ok(OFFLINE_ANSWER.to_string())
    }

    async fn summarize_capture(
        &self,
        _capture: &str,
        _subject: Option<&str>,
    ) -> Result<String, AssistError> {
        Ok(String::new())
    }
}
