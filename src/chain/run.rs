//! Chain definitions and their per-activation instances
//!
//! A `ChainDef` is the ordered list of steps built once at registration. Each
//! activation instantiates a `ChainRun` with a fresh accumulator and a cursor
//! that only moves forward, so no step runs twice or out of order.

use super::accumulator::{Accumulator, ConversationId};
use super::event::{ChainEvent, Finish};
use super::reply::{Keyboard, Reply, YES};
use super::signal::Signal;
use super::step::{Choice, Step, StepError, StepOutcome, StepResult};
use crate::db::LedgerHandle;
use async_trait::async_trait;
use std::sync::Arc;

pub const INVALID_ANSWER: &str = "Invalid answer.";

/// Where an activation stands after handling a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// A step rendered its prompt and waits for the next message
    Awaiting,
    Finished(Finish),
}

/// A running chain, type-erased so the router can hold any of them
#[async_trait]
pub trait ActiveChain: Send {
    /// Text that activated the chain
    fn command(&self) -> &str;

    /// Index of the current step
    fn cursor(&self) -> usize;

    /// Run from the first step until one waits for input or the chain ends
    async fn start(&mut self, events: &Signal<ChainEvent>) -> Progress;

    /// Feed the next inbound message to the waiting step
    async fn answer(&mut self, text: &str, events: &Signal<ChainEvent>) -> Progress;

    /// Drain replies produced so far
    fn take_replies(&mut self) -> Vec<Reply>;
}

/// Builds a fresh `ActiveChain` per activation
pub(crate) trait ChainFactory: Send + Sync {
    fn instantiate(
        &self,
        conversation: ConversationId,
        command: &str,
        ledger: Option<LedgerHandle>,
    ) -> Box<dyn ActiveChain>;
}

pub(crate) struct ChainDef<C> {
    steps: Arc<[Step<C>]>,
}

impl<C> ChainDef<C> {
    pub(crate) fn new(steps: Vec<Step<C>>) -> Self {
        Self {
            steps: Arc::from(steps),
        }
    }
}

impl<C: Default + Send + 'static> ChainFactory for ChainDef<C> {
    fn instantiate(
        &self,
        conversation: ConversationId,
        command: &str,
        ledger: Option<LedgerHandle>,
    ) -> Box<dyn ActiveChain> {
        Box::new(ChainRun {
            steps: Arc::clone(&self.steps),
            acc: Accumulator::new(conversation, command, ledger, C::default()),
            cursor: 0,
            pending: None,
        })
    }
}

/// What the current step is waiting for
enum Pending {
    Text,
    Confirm,
    /// Options resolved when the prompt was rendered
    Choice(Vec<Choice>),
}

pub(crate) struct ChainRun<C> {
    steps: Arc<[Step<C>]>,
    acc: Accumulator<C>,
    cursor: usize,
    pending: Option<Pending>,
}

impl<C: Send + 'static> ChainRun<C> {
    /// Activate steps from the cursor on until one needs input
    async fn advance(&mut self, events: &Signal<ChainEvent>) -> Progress {
        let steps = Arc::clone(&self.steps);

        while let Some(step) = steps.get(self.cursor) {
            let result = match step {
                Step::FreeText { prompt, .. } => {
                    let text = prompt.resolve(&self.acc);
                    self.acc.reply(text);
                    self.pending = Some(Pending::Text);
                    return Progress::Awaiting;
                }
                Step::Confirm { prompt, .. } => {
                    let text = prompt.resolve(&self.acc);
                    self.acc
                        .send(Reply::text(text).with_keyboard(Keyboard::yes_no()));
                    self.pending = Some(Pending::Confirm);
                    return Progress::Awaiting;
                }
                Step::Choice {
                    prompt,
                    options,
                    columns,
                    handler,
                } => match options(&self.acc) {
                    Ok(choices) if choices.is_empty() => Err(StepError::NoOptions),
                    Ok(mut choices) if choices.len() == 1 => {
                        // Nothing to ask: pick the only option
                        let only = choices.remove(0);
                        self.acc.reply(prompt.resolve(&self.acc));
                        self.acc.reply(format!("{} selected.", only.label));
                        handler(&mut self.acc, only.payload)
                    }
                    Ok(choices) => {
                        let keyboard =
                            Keyboard::grid(choices.iter().map(|c| c.label.clone()), *columns)
                                .one_time();
                        let text = prompt.resolve(&self.acc);
                        self.acc.send(Reply::text(text).with_keyboard(keyboard));
                        self.pending = Some(Pending::Choice(choices));
                        return Progress::Awaiting;
                    }
                    Err(e) => Err(e),
                },
                Step::Tap(handler) => handler(&mut self.acc),
                Step::TapAsync(handler) => handler(&mut self.acc).await,
                Step::Guard(handler) => handler(&mut self.acc).map(|()| StepOutcome::Continue),
            };

            if let Some(finish) = self.settle(step.kind(), result, events) {
                return Progress::Finished(finish);
            }
        }

        Progress::Finished(Finish::Completed)
    }

    /// Apply a callback result; `Some` when the chain must stop
    fn settle(
        &mut self,
        kind: &'static str,
        result: StepResult,
        events: &Signal<ChainEvent>,
    ) -> Option<Finish> {
        match result {
            Ok(StepOutcome::Continue) => {
                events.emit(ChainEvent::StepCompleted {
                    conversation: self.acc.conversation,
                    command: self.acc.command.clone(),
                    step: self.cursor,
                    kind,
                });
                self.cursor += 1;
                None
            }
            Ok(StepOutcome::Abort) => Some(Finish::Aborted),
            Ok(StepOutcome::Fail(reason)) => {
                self.acc.reply(reason.clone());
                Some(Finish::Failed(reason))
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(
                    conversation = %self.acc.conversation,
                    command = %self.acc.command,
                    step = self.cursor,
                    kind,
                    error = %reason,
                    "Step failed"
                );
                self.acc.reply(reason.clone());
                Some(Finish::Failed(reason))
            }
        }
    }
}

#[async_trait]
impl<C: Send + 'static> ActiveChain for ChainRun<C> {
    fn command(&self) -> &str {
        &self.acc.command
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    async fn start(&mut self, events: &Signal<ChainEvent>) -> Progress {
        self.advance(events).await
    }

    async fn answer(&mut self, text: &str, events: &Signal<ChainEvent>) -> Progress {
        let steps = Arc::clone(&self.steps);
        let (Some(step), Some(pending)) = (steps.get(self.cursor), self.pending.take()) else {
            return self.advance(events).await;
        };

        let result = match (step, &pending) {
            (Step::FreeText { handler, .. }, Pending::Text) => handler(&mut self.acc, text),
            (Step::Confirm { handler, .. }, Pending::Confirm) => {
                Some(handler(&mut self.acc, text == YES))
            }
            (Step::Choice { handler, .. }, Pending::Choice(choices)) => choices
                .iter()
                .find(|c| c.label == text)
                .map(|c| handler(&mut self.acc, c.payload.clone())),
            // Pending state always matches the step that armed it
            _ => return self.advance(events).await,
        };

        let Some(result) = result else {
            // Stay on this step: the slot remains armed for another try
            self.pending = Some(pending);
            self.acc.reply(INVALID_ANSWER);
            events.emit(ChainEvent::InvalidAnswer {
                conversation: self.acc.conversation,
                command: self.acc.command.clone(),
                step: self.cursor,
            });
            return Progress::Awaiting;
        };

        if let Some(finish) = self.settle(step.kind(), result, events) {
            return Progress::Finished(finish);
        }
        self.advance(events).await
    }

    fn take_replies(&mut self) -> Vec<Reply> {
        self.acc.take_replies()
    }
}
