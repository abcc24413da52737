//! Per-activation chain context

use super::reply::Reply;
use super::step::StepError;
use crate::db::LedgerHandle;
use std::fmt;

/// Identifies one chat/channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State shared by the steps of one chain activation.
///
/// `data` is the chain's typed context; the rest is filled in by the router
/// when the command is activated.
pub struct Accumulator<C> {
    pub conversation: ConversationId,
    /// Raw text that activated the command
    pub command: String,
    pub data: C,
    ledger: Option<LedgerHandle>,
    outbox: Vec<Reply>,
}

impl<C> Accumulator<C> {
    pub(crate) fn new(
        conversation: ConversationId,
        command: impl Into<String>,
        ledger: Option<LedgerHandle>,
        data: C,
    ) -> Self {
        Self {
            conversation,
            command: command.into(),
            data,
            ledger,
            outbox: Vec::new(),
        }
    }

    /// Ledger resolved at activation
    pub fn ledger(&self) -> Result<&LedgerHandle, StepError> {
        self.ledger.as_ref().ok_or(StepError::NoLedger)
    }

    pub fn has_ledger(&self) -> bool {
        self.ledger.is_some()
    }

    pub(crate) fn set_ledger(&mut self, ledger: LedgerHandle) {
        self.ledger = Some(ledger);
    }

    pub fn reply(&mut self, text: impl Into<String>) {
        self.outbox.push(Reply::text(text));
    }

    /// Reply with text already escaped for `MarkdownV2`
    pub fn reply_markdown(&mut self, text: impl Into<String>) {
        self.outbox.push(Reply::markdown(text));
    }

    pub fn send(&mut self, reply: Reply) {
        self.outbox.push(reply);
    }

    pub(crate) fn take_replies(&mut self) -> Vec<Reply> {
        std::mem::take(&mut self.outbox)
    }
}

impl<C: fmt::Debug> fmt::Debug for Accumulator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulator")
            .field("conversation", &self.conversation)
            .field("command", &self.command)
            .field("data", &self.data)
            .field("ledger", &self.ledger)
            .field("pending_replies", &self.outbox.len())
            .finish()
    }
}
