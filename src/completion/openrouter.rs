//! OpenRouter (OpenAI-compatible chat completions) implementation

use super::{CompletionError, CompletionMessage, CompletionService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

pub struct OpenRouterService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterService {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| CompletionError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
        })
    }

    fn normalize_response(resp: ChatResponse) -> Result<String, CompletionError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::empty("No choices in response"))?;

        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(CompletionError::empty("No response from the assistant...")),
        }
    }
}

#[async_trait]
impl CompletionService for OpenRouterService {
    async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    CompletionError::network(format!("Connection failed: {e}"))
                } else {
                    CompletionError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            return Err(CompletionError::from_status(status.as_u16(), &message));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            CompletionError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [CompletionMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}
