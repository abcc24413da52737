//! Telegram Bot API transport
//!
//! Outbound replies go through `sendMessage`; inbound messages arrive by
//! long-polling `getUpdates` and are handed to the conversation manager.

pub mod types;

use crate::chain::{CommandRegistry, ConversationId, Reply, Trigger};
use crate::runtime::{ConversationManager, Session, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use types::{ApiResponse, BotCommand, GetUpdates, SendMessage, SetMyCommands, Update, User};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Slack on top of the long-poll timeout before giving up on a request
const REQUEST_GRACE: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(3);

pub struct TelegramClient {
    client: Client,
    /// `<api url>/bot<token>`
    endpoint: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self, TransportError> {
        Self::with_api_url(token, DEFAULT_API_URL)
    }

    pub fn with_api_url(token: &str, api_url: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        })
    }

    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", &serde_json::json!({}), None).await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: &["message"],
        };
        let timeout = Duration::from_secs(timeout_secs) + REQUEST_GRACE;
        self.call("getUpdates", &body, Some(timeout)).await
    }

    pub async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<(), TransportError> {
        let _: serde_json::Value = self
            .call("sendMessage", &SendMessage::new(chat_id, reply), None)
            .await?;
        Ok(())
    }

    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), TransportError> {
        let _: bool = self
            .call("setMyCommands", &SetMyCommands { commands }, None)
            .await?;
        Ok(())
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, TransportError> {
        let mut request = self
            .client
            .post(format!("{}/{method}", self.endpoint))
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // The URL carries the token
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read response: {e}")))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&body)
            .map_err(|e| TransportError::Decode(format!("{method}: {e}")))?;
        parse_response(parsed)
    }
}

fn parse_response<T>(response: ApiResponse<T>) -> Result<T, TransportError> {
    match response {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse { ok: true, .. } => Err(TransportError::Decode("missing result".to_string())),
        ApiResponse {
            description,
            error_code,
            ..
        } => Err(TransportError::Api {
            code: error_code.unwrap_or_default(),
            description: description.unwrap_or_default(),
        }),
    }
}

#[async_trait]
impl Session for TelegramClient {
    async fn send(&self, conversation: ConversationId, reply: &Reply) -> Result<(), TransportError> {
        self.send_message(conversation.0, reply).await
    }
}

/// Client-side command menu entries for the literal slash commands
pub fn bot_commands(registry: &CommandRegistry) -> Vec<BotCommand> {
    registry
        .descriptors()
        .iter()
        .filter_map(|descriptor| {
            let Trigger::Exact(trigger) = &descriptor.trigger else {
                return None;
            };
            let name = trigger.strip_prefix('/')?;
            let valid = !name.is_empty()
                && name.len() <= 32
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            valid.then(|| BotCommand {
                command: name.to_string(),
                description: descriptor.description.clone(),
            })
        })
        .collect()
}

/// Feed inbound messages to `manager` until `cancel` fires
pub async fn poll(
    client: &TelegramClient,
    manager: &ConversationManager,
    cancel: CancellationToken,
    timeout_secs: u64,
) {
    let mut offset = None;
    tracing::info!(timeout_secs, "Polling for updates");

    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = client.get_updates(offset, timeout_secs) => result,
        };

        match result {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    if let Some((chat_id, text)) = update.into_text() {
                        tracing::debug!(chat_id, "Inbound message");
                        manager.deliver(ConversationId(chat_id), text).await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch updates, retrying");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    tracing::info!("Polling stopped");
}
