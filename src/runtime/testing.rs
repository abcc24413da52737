//! Mock implementations for testing
//!
//! These mocks enable end-to-end command tests without a chat transport or a
//! completion backend.

use super::router::{ConversationState, Router};
use super::traits::*;
use crate::chain::{ChainEvent, CommandRegistry, ConversationId, Reply};
use crate::completion::{CompletionError, CompletionMessage, CompletionService};
use crate::db::Database;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Session
// ============================================================================

/// Session that records every reply it is asked to send
#[derive(Default)]
pub struct MockSession {
    sent: Mutex<Vec<(ConversationId, Reply)>>,
    failures: Mutex<usize>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends
    pub fn fail_next(&self, count: usize) {
        *self.failures.lock().unwrap() = count;
    }

    pub fn sent(&self) -> Vec<(ConversationId, Reply)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, conversation: ConversationId) -> Vec<Reply> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == conversation)
            .map(|(_, r)| r)
            .collect()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn send(&self, conversation: ConversationId, reply: &Reply) -> Result<(), TransportError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Network("mock failure".to_string()));
            }
        }
        self.sent.lock().unwrap().push((conversation, reply.clone()));
        Ok(())
    }
}

// ============================================================================
// Mock Completion Service
// ============================================================================

/// Completion service that returns queued responses
pub struct MockCompletion {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<Vec<CompletionMessage>>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(response.into()));
    }

    pub fn queue_error(&self, error: CompletionError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<Vec<CompletionMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, messages: &[CompletionMessage]) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Test Bot
// ============================================================================

pub const TEST_CHAT: ConversationId = ConversationId(42);

/// Router plus per-conversation state over an in-memory database
pub struct TestBot {
    pub db: Database,
    router: Router,
    states: HashMap<ConversationId, ConversationState>,
    events: Arc<Mutex<Vec<ChainEvent>>>,
}

impl TestBot {
    pub fn new(build: impl FnOnce(&mut CommandRegistry, &Database)) -> Self {
        let db = Database::open_in_memory().unwrap();
        let mut registry = CommandRegistry::new();
        build(&mut registry, &db);

        let router = Router::new(registry, Arc::new(db.clone()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&events);
        router
            .events()
            .subscribe(move |event: &ChainEvent| recorded.lock().unwrap().push(event.clone()));

        Self {
            db,
            router,
            states: HashMap::new(),
            events,
        }
    }

    /// Link the default test chat to a fresh ledger
    pub fn with_ledger(self) -> Self {
        self.db.create_ledger_for_chat(TEST_CHAT.0).unwrap();
        self
    }

    pub async fn send(&mut self, text: &str) -> Vec<Reply> {
        self.send_from(TEST_CHAT, text).await
    }

    pub async fn send_from(&mut self, conversation: ConversationId, text: &str) -> Vec<Reply> {
        let state = self.states.entry(conversation).or_default();
        self.router.dispatch(state, conversation, text).await
    }

    /// Send and return only the reply texts
    pub async fn texts(&mut self, text: &str) -> Vec<String> {
        self.send(text).await.into_iter().map(|r| r.text).collect()
    }

    pub fn events(&self) -> Vec<ChainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn finished_count(&self) -> usize {
        self.events().iter().filter(|e| e.is_finished()).count()
    }

    pub fn is_awaiting(&self, conversation: ConversationId) -> bool {
        self.states
            .get(&conversation)
            .is_some_and(ConversationState::is_awaiting)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}
