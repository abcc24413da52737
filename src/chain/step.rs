//! Step definitions and the outcomes their callbacks return

use super::accumulator::Accumulator;
use crate::completion::CompletionError;
use crate::db::DbError;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

/// What a step callback wants to happen next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Move on to the next step (or finish if this was the last one)
    Continue,
    /// Stop the chain quietly; the callback has already told the user why
    Abort,
    /// Stop the chain and show `reason` to the user
    Fail(String),
}

/// Typed failure raised by a step callback. The message is shown to the user
/// and the chain halts.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    Guard(String),
    #[error("No ledger is set up for this chat yet. Use /start to create one.")]
    NoLedger,
    #[error("No options available.")]
    NoOptions,
    #[error("Something went wrong while accessing your data: {0}")]
    Store(#[from] DbError),
    #[error("The assistant is unavailable right now: {0}")]
    Completion(#[from] CompletionError),
}

impl StepError {
    pub fn guard(message: impl Into<String>) -> Self {
        Self::Guard(message.into())
    }
}

pub type StepResult = Result<StepOutcome, StepError>;

/// One selectable answer of a `choice` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub payload: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, payload: impl ToString) -> Self {
        Self {
            label: label.into(),
            payload: payload.to_string(),
        }
    }
}

/// Prompt text, fixed or computed from the accumulator when the step activates
pub enum Prompt<C> {
    Text(String),
    Dynamic(Arc<dyn Fn(&Accumulator<C>) -> String + Send + Sync>),
}

impl<C> Prompt<C> {
    pub fn dynamic(f: impl Fn(&Accumulator<C>) -> String + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    pub(crate) fn resolve(&self, acc: &Accumulator<C>) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Dynamic(f) => f(acc),
        }
    }
}

impl<C> From<&str> for Prompt<C> {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl<C> From<String> for Prompt<C> {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Parses and handles a free-text answer; `None` means the answer was invalid
pub(crate) type TextHandler<C> =
    Box<dyn Fn(&mut Accumulator<C>, &str) -> Option<StepResult> + Send + Sync>;
pub(crate) type ConfirmHandler<C> = Box<dyn Fn(&mut Accumulator<C>, bool) -> StepResult + Send + Sync>;
pub(crate) type OptionsFn<C> =
    Box<dyn Fn(&Accumulator<C>) -> Result<Vec<Choice>, StepError> + Send + Sync>;
pub(crate) type ChoiceHandler<C> =
    Box<dyn Fn(&mut Accumulator<C>, String) -> StepResult + Send + Sync>;
pub(crate) type TapHandler<C> = Box<dyn Fn(&mut Accumulator<C>) -> StepResult + Send + Sync>;
pub(crate) type AsyncTapHandler<C> =
    Box<dyn for<'a> Fn(&'a mut Accumulator<C>) -> BoxFuture<'a, StepResult> + Send + Sync>;
pub(crate) type GuardHandler<C> =
    Box<dyn Fn(&mut Accumulator<C>) -> Result<(), StepError> + Send + Sync>;

/// One entry of a chain definition
pub(crate) enum Step<C> {
    FreeText {
        prompt: Prompt<C>,
        handler: TextHandler<C>,
    },
    Confirm {
        prompt: Prompt<C>,
        handler: ConfirmHandler<C>,
    },
    Choice {
        prompt: Prompt<C>,
        options: OptionsFn<C>,
        columns: usize,
        handler: ChoiceHandler<C>,
    },
    Tap(TapHandler<C>),
    TapAsync(AsyncTapHandler<C>),
    Guard(GuardHandler<C>),
}

impl<C> Step<C> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::FreeText { .. } => "free_text",
            Self::Confirm { .. } => "confirm",
            Self::Choice { .. } => "choice",
            Self::Tap(_) => "tap",
            Self::TapAsync(_) => "tap_async",
            Self::Guard(_) => "guard",
        }
    }
}
