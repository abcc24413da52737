//! Text-completion service abstraction
//!
//! Used by the `/insights` command to answer free-form questions about
//! spending.

mod error;
mod openrouter;

pub use error::{CompletionError, CompletionErrorKind};
pub use openrouter::{OpenRouterService, DEFAULT_MODEL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for the completion service
#[derive(Debug, Clone, Default)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// Chat message sent to the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl CompletionMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Common interface for completion providers
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, CompletionError>;

    fn model_id(&self) -> &str;
}

/// Build the configured service, wrapped for logging. `None` when no API key is set.
pub fn from_config(config: &CompletionConfig) -> Result<Option<Arc<dyn CompletionService>>, CompletionError> {
    let Some(api_key) = config.api_key.clone() else {
        return Ok(None);
    };
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let service = OpenRouterService::new(api_key, model, config.base_url.clone())?;
    Ok(Some(Arc::new(LoggingService::new(Arc::new(service)))))
}

/// Logging wrapper for completion services
pub struct LoggingService {
    inner: Arc<dyn CompletionService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn CompletionService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl CompletionService for LoggingService {
    async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, CompletionError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(messages).await;
        let duration = start.elapsed();

        match &result {
            Ok(text) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    chars = text.len(),
                    "Completion request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    transient = e.kind.is_transient(),
                    "Completion request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
