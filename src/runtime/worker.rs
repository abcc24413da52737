//! Per-conversation worker task

use super::router::{ConversationState, Router};
use super::traits::Session;
use super::{WorkerTable, INBOX_CAPACITY};
use crate::chain::ConversationId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Owns one conversation's routing state and handles its messages in arrival
/// order; a message is fully handled, replies included, before the next one
/// is read.
///
/// A worker with nothing armed exits after `idle_timeout` without messages
/// and takes its entry out of the worker table.
pub struct ConversationWorker {
    conversation: ConversationId,
    router: Arc<Router>,
    session: Arc<dyn Session>,
    workers: WorkerTable,
    state: ConversationState,
    inbox: mpsc::Receiver<String>,
    idle_timeout: Duration,
}

impl ConversationWorker {
    pub fn new(
        conversation: ConversationId,
        router: Arc<Router>,
        session: Arc<dyn Session>,
        workers: WorkerTable,
        inbox: mpsc::Receiver<String>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            conversation,
            router,
            session,
            workers,
            state: ConversationState::default(),
            inbox,
            idle_timeout,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(conversation = %self.conversation, "Conversation worker started");

        loop {
            match tokio::time::timeout(self.idle_timeout, self.inbox.recv()).await {
                Ok(Some(text)) => self.handle(&text).await,
                Ok(None) => break,
                // A waiting step keeps its state alive
                Err(_) if self.state.is_awaiting() => {}
                Err(_) => {
                    if self.retire().await {
                        break;
                    }
                }
            }
        }

        tracing::debug!(conversation = %self.conversation, "Conversation worker stopped");
    }

    async fn handle(&mut self, text: &str) {
        let replies = self
            .router
            .dispatch(&mut self.state, self.conversation, text)
            .await;

        for reply in &replies {
            if let Err(e) = self.session.send(self.conversation, reply).await {
                tracing::warn!(
                    conversation = %self.conversation,
                    error = %e,
                    "Failed to deliver reply"
                );
            }
        }
    }

    /// Leave the worker table; `false` when messages raced in and the worker
    /// must keep going on a fresh inbox
    async fn retire(&mut self) -> bool {
        let mut workers = self.workers.write().await;
        self.inbox.close();

        let mut leftover = Vec::new();
        while let Ok(text) = self.inbox.try_recv() {
            leftover.push(text);
        }

        if leftover.is_empty() {
            workers.remove(&self.conversation);
            return true;
        }

        // Senders holding the closed inbox retry against this entry
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        workers.insert(self.conversation, tx);
        self.inbox = rx;
        drop(workers);

        for text in leftover {
            self.handle(&text).await;
        }
        false
    }
}
