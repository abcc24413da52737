//! Fluent chain construction
//!
//! ```ignore
//! registry
//!     .register::<Draft>("/add_category", "Adds a new expense category", true)
//!     .requires_ledger()
//!     .free_text("Icon of the category?", |acc, icon| {
//!         acc.data.icon = icon;
//!         Ok(StepOutcome::Continue)
//!     })
//!     .confirm("Are you sure?", |acc, ok| { /* ... */ })
//!     .install()?;
//! ```

use super::accumulator::Accumulator;
use super::registry::{CommandAction, CommandDescriptor, CommandRegistry, RegistryError};
use super::run::ChainDef;
use super::step::{Choice, Prompt, Step, StepError, StepOutcome, StepResult};
use futures::future::BoxFuture;

/// Collects the steps of one command; nothing is routed until `install`
#[must_use = "a command is only routed once installed"]
pub struct ChainBuilder<'r, C> {
    registry: &'r mut CommandRegistry,
    descriptor: CommandDescriptor,
    requires_ledger: bool,
    steps: Vec<Step<C>>,
}

impl<'r, C: Default + Send + 'static> ChainBuilder<'r, C> {
    pub(crate) fn new(registry: &'r mut CommandRegistry, descriptor: CommandDescriptor) -> Self {
        Self {
            registry,
            descriptor,
            requires_ledger: false,
            steps: Vec::new(),
        }
    }

    /// Refuse to start the chain unless the conversation already has a ledger
    pub fn requires_ledger(mut self) -> Self {
        self.requires_ledger = true;
        self
    }

    /// Ask a question and hand the raw answer to `callback`
    pub fn free_text<F>(self, prompt: impl Into<Prompt<C>>, callback: F) -> Self
    where
        F: Fn(&mut Accumulator<C>, String) -> StepResult + Send + Sync + 'static,
    {
        self.free_text_parsed(prompt, |text| Some(text.to_string()), callback)
    }

    /// Ask a question; answers `parser` rejects are met with "Invalid answer."
    /// and the question stays open
    pub fn free_text_parsed<T, P, F>(
        mut self,
        prompt: impl Into<Prompt<C>>,
        parser: P,
        callback: F,
    ) -> Self
    where
        P: Fn(&str) -> Option<T> + Send + Sync + 'static,
        F: Fn(&mut Accumulator<C>, T) -> StepResult + Send + Sync + 'static,
    {
        self.steps.push(Step::FreeText {
            prompt: prompt.into(),
            handler: Box::new(move |acc: &mut Accumulator<C>, text: &str| {
                parser(text).map(|value| callback(acc, value))
            }),
        });
        self
    }

    /// Yes/No question; only the affirmative label counts as yes
    pub fn confirm<F>(mut self, prompt: impl Into<Prompt<C>>, callback: F) -> Self
    where
        F: Fn(&mut Accumulator<C>, bool) -> StepResult + Send + Sync + 'static,
    {
        self.steps.push(Step::Confirm {
            prompt: prompt.into(),
            handler: Box::new(callback),
        });
        self
    }

    /// Multiple choice, one option per row
    pub fn choice<O, F>(self, prompt: impl Into<Prompt<C>>, options: O, callback: F) -> Self
    where
        O: Fn(&Accumulator<C>) -> Result<Vec<Choice>, StepError> + Send + Sync + 'static,
        F: Fn(&mut Accumulator<C>, String) -> StepResult + Send + Sync + 'static,
    {
        self.choice_in_columns(prompt, 1, options, callback)
    }

    /// Multiple choice laid out in `columns` columns.
    ///
    /// Options are resolved when the step activates. A single option is
    /// selected without asking; no options at all fails the chain.
    pub fn choice_in_columns<O, F>(
        mut self,
        prompt: impl Into<Prompt<C>>,
        columns: usize,
        options: O,
        callback: F,
    ) -> Self
    where
        O: Fn(&Accumulator<C>) -> Result<Vec<Choice>, StepError> + Send + Sync + 'static,
        F: Fn(&mut Accumulator<C>, String) -> StepResult + Send + Sync + 'static,
    {
        self.steps.push(Step::Choice {
            prompt: prompt.into(),
            options: Box::new(options),
            columns,
            handler: Box::new(callback),
        });
        self
    }

    /// Side effect without user input
    pub fn tap<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Accumulator<C>) -> StepResult + Send + Sync + 'static,
    {
        self.steps.push(Step::Tap(Box::new(callback)));
        self
    }

    /// Asynchronous side effect without user input; the conversation does not
    /// take its next message until the future settles
    pub fn tap_async<F>(mut self, callback: F) -> Self
    where
        F: for<'a> Fn(&'a mut Accumulator<C>) -> BoxFuture<'a, StepResult> + Send + Sync + 'static,
    {
        self.steps.push(Step::TapAsync(Box::new(callback)));
        self
    }

    /// Precondition check; an error halts the chain and its message is shown
    pub fn guard<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Accumulator<C>) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.steps.push(Step::Guard(Box::new(callback)));
        self
    }

    pub fn install(self) -> Result<(), RegistryError> {
        if self.steps.is_empty() {
            return Err(RegistryError::Empty(self.descriptor.trigger.to_string()));
        }
        tracing::debug!(
            trigger = %self.descriptor.trigger,
            steps = self.steps.len(),
            "Installing command"
        );
        let action = CommandAction::Chain(Box::new(ChainDef::new(self.steps)));
        self.registry
            .insert(self.descriptor, self.requires_ledger, action)
    }
}

/// Shorthand for the common "carry on" result
pub fn proceed() -> StepResult {
    Ok(StepOutcome::Continue)
}
