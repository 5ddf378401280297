use std::time::Duration;

use async_trait::async_trait;

/// Typed errors from the AI collaborators. These never reach an end client:
/// the fallback layer converts every one of them into a safe default value.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AssistError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("upstream status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("empty completion")]
    EmptyCompletion,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AssistError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Upstream { .. } => "upstream",
            Self::Network(_) => "network",
            Self::EmptyCompletion => "empty_completion",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// The external text-cleaning / answering / capture-summarization
/// collaborator. `capture` is an opaque reference to a stored slide image;
/// `subject` is a short course hint passed through to the prompts.
#[async_trait]
pub trait Assistant: Send + Sync {
    fn name(&self) -> &str;

    /// Rewrite a raw student question into a cleaned-up form.
    async fn clean(
        &self,
        text: &str,
        capture: Option<&str>,
        subject: Option<&str>,
    ) -> Result<String, AssistError>;

    /// Produce a teaching-assistant answer for a (cleaned) question.
    async fn answer(
        &self,
        text: &str,
        capture: Option<&str>,
        subject: Option<&str>,
    ) -> Result<String, AssistError>;

    /// One-line summary of a captured slide. An empty string means the
    /// collaborator had nothing to say; callers treat it as no summary.
    async fn summarize_capture(
        &self,
        capture: &str,
        subject: Option<&str>,
    ) -> Result<String, AssistError>;
}
