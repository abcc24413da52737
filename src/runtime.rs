//! Runtime for driving conversations
//!
//! Every conversation gets its own worker task fed through a channel, so
//! messages of one conversation are handled strictly in order while
//! different conversations proceed independently.

mod router;
pub mod traits;
mod worker;

#[cfg(test)]
pub mod testing;

pub use router::{ConversationState, Router, ALL_DONE, CANCELLED, CANCEL_TRIGGER, NOTHING_TO_CANCEL};
pub use traits::*;

use crate::chain::ConversationId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use worker::ConversationWorker;

const INBOX_CAPACITY: usize = 32;

/// Workers with nothing armed exit after this long without messages
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Conversation to the inbox of its live worker
type WorkerTable = Arc<RwLock<HashMap<ConversationId, mpsc::Sender<String>>>>;

/// Dispatch table from conversation to its worker
pub struct ConversationManager {
    router: Arc<Router>,
    session: Arc<dyn Session>,
    workers: WorkerTable,
    idle_timeout: Duration,
}

impl ConversationManager {
    pub fn new(router: Arc<Router>, session: Arc<dyn Session>) -> Self {
        Self {
            router,
            session,
            workers: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Queue an inbound message for its conversation.
    ///
    /// Never waits on a busy conversation: when its inbox is full the message
    /// is dropped.
    pub async fn deliver(&self, conversation: ConversationId, text: String) {
        let inbox = self.get_or_spawn(conversation).await;
        let text = match inbox.try_send(text) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%conversation, "Conversation inbox full, dropping message");
                return;
            }
            Err(mpsc::error::TrySendError::Closed(text)) => text,
        };

        // Worker is gone; start over with a fresh one
        tracing::debug!(%conversation, "Conversation worker stopped, restarting");
        {
            let mut workers = self.workers.write().await;
            if workers.get(&conversation).is_some_and(mpsc::Sender::is_closed) {
                workers.remove(&conversation);
            }
        }
        let inbox = self.get_or_spawn(conversation).await;
        if let Err(e) = inbox.try_send(text) {
            tracing::error!(%conversation, error = %e, "Dropped message for conversation");
        }
    }

    /// Number of conversations with a live worker
    pub async fn active_conversations(&self) -> usize {
        self.workers.read().await.len()
    }

    async fn get_or_spawn(&self, conversation: ConversationId) -> mpsc::Sender<String> {
        // Check if already running
        {
            let workers = self.workers.read().await;
            if let Some(inbox) = workers.get(&conversation) {
                return inbox.clone();
            }
        }

        let mut workers = self.workers.write().await;
        // Another message may have spawned it while we waited for the lock
        if let Some(inbox) = workers.get(&conversation) {
            return inbox.clone();
        }

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let worker = ConversationWorker::new(
            conversation,
            Arc::clone(&self.router),
            Arc::clone(&self.session),
            Arc::clone(&self.workers),
            rx,
            self.idle_timeout,
        );
        tokio::spawn(worker.run());
        workers.insert(conversation, tx.clone());
        tx
    }
}
