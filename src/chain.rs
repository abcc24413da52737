//! Interaction-chain engine
//!
//! A command is an ordered list of steps. Steps that need an answer arm the
//! conversation's pending slot; the next inbound message resumes the chain at
//! that step. Every activation ends in exactly one terminal render.

mod accumulator;
mod builder;
mod event;
mod registry;
mod reply;
mod run;
mod signal;
mod step;

#[cfg(test)]
mod proptests;

pub use accumulator::{Accumulator, ConversationId};
pub use builder::{proceed, ChainBuilder};
pub use event::{ChainEvent, Finish};
pub use registry::{CommandDescriptor, CommandRegistry, RegistryError, Trigger, HELP_TRIGGER};
pub use reply::{Keyboard, Reply, ReplyFormat, NO, YES};
pub use run::{ActiveChain, Progress, INVALID_ANSWER};
pub use signal::Signal;
pub use step::{Choice, Prompt, StepError, StepOutcome, StepResult};

pub(crate) use registry::{Command, CommandAction};
