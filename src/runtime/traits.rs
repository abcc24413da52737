//! Trait abstractions for runtime I/O
//!
//! These traits let the router and workers run against mock implementations.

use crate::chain::{ConversationId, Reply};
use crate::db::{Database, DbResult, LedgerHandle};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Bot API error ({code}): {description}")]
    Api { code: i64, description: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Outbound channel to a conversation
#[async_trait]
pub trait Session: Send + Sync {
    async fn send(&self, conversation: ConversationId, reply: &Reply) -> Result<(), TransportError>;
}

/// Finds the ledger a conversation writes to
pub trait LedgerResolver: Send + Sync {
    fn resolve(&self, conversation: ConversationId) -> DbResult<Option<LedgerHandle>>;
}

impl LedgerResolver for Database {
    fn resolve(&self, conversation: ConversationId) -> DbResult<Option<LedgerHandle>> {
        self.ledger_for_chat(conversation.0)
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Session + ?Sized> Session for Arc<T> {
    async fn send(&self, conversation: ConversationId, reply: &Reply) -> Result<(), TransportError> {
        (**self).send(conversation, reply).await
    }
}

impl<T: LedgerResolver + ?Sized> LedgerResolver for Arc<T> {
    fn resolve(&self, conversation: ConversationId) -> DbResult<Option<LedgerHandle>> {
        (**self).resolve(conversation)
    }
}
