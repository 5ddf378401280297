use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::instrument;

use lectern_core::{AssistError, Assistant};

use crate::prompts::{self, Prompt};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// The clean step sits on an interactive request path, so it runs on the
// lighter model; answers and capture summaries use the default model.
const CLEAN_MODEL: &str = "gemini-2.5-flash-lite";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const TEMPERATURE: f64 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 10_000;

/// Gemini-backed Assistant speaking the `generateContent` REST API.
pub struct GeminiAssistant {
    client: Client,
    api_key: SecretString,
    clean_model: String,
    default_model: String,
}

impl GeminiAssistant {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            clean_model: CLEAN_MODEL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Override the model pair, e.g. to pin a preview build.
    pub fn with_models(mut self, clean_model: &str, default_model: &str) -> Self {
        self.clean_model = clean_model.to_string();
        self.default_model = default_model.to_string();
        self
    }

    fn request_body(prompt: &Prompt, capture: Option<&str>) -> serde_json::Value {
        let mut parts = vec![json!({"text": prompt.user})];
        if let Some(uri) = capture {
            parts.push(json!({"file_data": {"file_uri": uri}}));
        }

        json!({
            "system_instruction": {"parts": [{"text": prompt.system}]},
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        })
    }

    #[instrument(skip(self, prompt, capture), fields(model))]
    async fn generate(
        &self,
        model: &str,
        prompt: Prompt,
        capture: Option<&str>,
    ) -> Result<String, AssistError> {
        let url = format!("{API_BASE}/{model}:generateContent");
        let body = Self::request_body(&prompt, capture);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistError::Timeout(CONNECT_TIMEOUT)
                } else {
                    AssistError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistError::InvalidResponse(e.to_string()))?;

        extract_text(&payload)
    }
}

/// Pull the concatenated candidate text out of a generateContent response.
fn extract_text(payload: &serde_json::Value) -> Result<String, AssistError> {
    let parts = payload
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| AssistError::InvalidResponse("no candidates in response".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AssistError::EmptyCompletion);
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl Assistant for GeminiAssistant {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn clean(
        &self,
        text: &str,
        capture: Option<&str>,
        subject: Option<&str>,
    ) -> Result<String, AssistError> {
        let prompt = prompts::clean_question(text, capture.is_some(), subject);
        self.generate(&self.clean_model, prompt, capture).await
    }

    async fn answer(
        &self,
        text: &str,
        capture: Option<&str>,
        subject: Option<&str>,
    ) -> Result<String, AssistError> {
        let prompt = prompts::answer_question(text, capture.is_some(), subject);
        self.generate(&self.default_model, prompt, capture).await
    }

    async fn summarize_capture(
        &self,
        capture: &str,
        subject: Option<&str>,
    ) -> Result<String, AssistError> {
        let prompt = prompts::summarize_capture(subject);
        self.generate(&self.default_model, prompt, Some(capture)).await
    }
}
