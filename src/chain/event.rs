//! Events published while chains run

use super::accumulator::ConversationId;

/// How a chain activation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finish {
    /// Every step ran
    Completed,
    /// A callback returned `StepOutcome::Abort`
    Aborted,
    /// A callback returned `StepOutcome::Fail` or raised a `StepError`
    Failed(String),
    /// The user sent `/cancel` while a step was waiting
    Cancelled,
}

impl Finish {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Started {
        conversation: ConversationId,
        command: String,
    },
    StepCompleted {
        conversation: ConversationId,
        command: String,
        step: usize,
        kind: &'static str,
    },
    InvalidAnswer {
        conversation: ConversationId,
        command: String,
        step: usize,
    },
    /// Terminal state was rendered
    Finished {
        conversation: ConversationId,
        command: String,
        finish: Finish,
    },
}

impl ChainEvent {
    pub fn conversation(&self) -> ConversationId {
        match self {
            Self::Started { conversation, .. }
            | Self::StepCompleted { conversation, .. }
            | Self::InvalidAnswer { conversation, .. }
            | Self::Finished { conversation, .. } => *conversation,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}
