//! Command registry: triggers, descriptors, and help/menu rendering
//!
//! Built once at process start and shared read-only with the router.

use super::builder::ChainBuilder;
use super::reply::Keyboard;
use super::run::ChainFactory;
use crate::db::LedgerHandle;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub const HELP_TRIGGER: &str = "/help";

/// What activates a command
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Whole message, after stripping the bot addressing suffix
    Exact(String),
    /// Tested against the raw message
    Pattern(Regex),
}

impl Trigger {
    pub fn pattern(source: &str) -> Result<Self, RegistryError> {
        Ok(Self::Pattern(Regex::new(source)?))
    }

    /// Key used to detect duplicate registrations
    fn key(&self) -> String {
        match self {
            Self::Exact(text) => text.clone(),
            Self::Pattern(re) => format!("/{}/", re.as_str()),
        }
    }
}

impl From<&str> for Trigger {
    fn from(text: &str) -> Self {
        Self::Exact(text.to_string())
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Registration metadata, in registration order
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub trigger: Trigger,
    pub description: String,
    /// Shown in the main menu and the fallback listing
    pub important: bool,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Command {0} is already registered")]
    Duplicate(String),
    #[error("Command {0} has no steps")]
    Empty(String),
    #[error("Invalid command pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub(crate) enum CommandAction {
    Help,
    Chain(Box<dyn ChainFactory>),
}

pub(crate) struct Command {
    pub(crate) requires_ledger: bool,
    pub(crate) action: CommandAction,
}

/// Returns setup commands to suggest when the ledger is missing something,
/// or `None` when the regular menu applies
pub type SetupCheck = Box<dyn Fn(Option<&LedgerHandle>) -> Option<Vec<String>> + Send + Sync>;

pub struct CommandRegistry {
    descriptors: Vec<CommandDescriptor>,
    commands: Vec<Command>,
    exact: HashMap<String, usize>,
    patterns: Vec<(Regex, usize)>,
    setup_check: Option<SetupCheck>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let help = CommandDescriptor {
            trigger: Trigger::from(HELP_TRIGGER),
            description: "Shows this help".to_string(),
            important: true,
        };
        let mut registry = Self {
            descriptors: Vec::new(),
            commands: Vec::new(),
            exact: HashMap::new(),
            patterns: Vec::new(),
            setup_check: None,
        };
        registry.push(help, false, CommandAction::Help);
        registry
    }

    /// Start declaring the chain run when `trigger` arrives
    pub fn register<C: Default + Send + 'static>(
        &mut self,
        trigger: impl Into<Trigger>,
        description: impl Into<String>,
        important: bool,
    ) -> ChainBuilder<'_, C> {
        let descriptor = CommandDescriptor {
            trigger: trigger.into(),
            description: description.into(),
            important,
        };
        ChainBuilder::new(self, descriptor)
    }

    pub fn set_setup_check(
        &mut self,
        check: impl Fn(Option<&LedgerHandle>) -> Option<Vec<String>> + Send + Sync + 'static,
    ) {
        self.setup_check = Some(Box::new(check));
    }

    pub(crate) fn insert(
        &mut self,
        descriptor: CommandDescriptor,
        requires_ledger: bool,
        action: CommandAction,
    ) -> Result<(), RegistryError> {
        let key = descriptor.trigger.key();
        if self.descriptors.iter().any(|d| d.trigger.key() == key) {
            return Err(RegistryError::Duplicate(key));
        }
        self.push(descriptor, requires_ledger, action);
        Ok(())
    }

    fn push(&mut self, descriptor: CommandDescriptor, requires_ledger: bool, action: CommandAction) {
        let index = self.commands.len();
        match &descriptor.trigger {
            Trigger::Exact(text) => {
                self.exact.insert(text.clone(), index);
            }
            Trigger::Pattern(re) => self.patterns.push((re.clone(), index)),
        }
        self.descriptors.push(descriptor);
        self.commands.push(Command {
            requires_ledger,
            action,
        });
    }

    pub fn descriptors(&self) -> &[CommandDescriptor] {
        &self.descriptors
    }

    pub(crate) fn exact(&self, text: &str) -> Option<&Command> {
        self.exact.get(text).map(|&i| &self.commands[i])
    }

    /// First pattern command matching `text`, in registration order
    pub(crate) fn matching(&self, text: &str) -> Option<&Command> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|&(_, i)| &self.commands[i])
    }

    /// Full listing for `/help`
    pub fn help_text(&self) -> String {
        let mut text = String::from("Available commands:\n\n");
        for descriptor in &self.descriptors {
            text.push_str(&format!(
                "{}\n  {}\n\n",
                descriptor.trigger, descriptor.description
            ));
        }
        text.trim_end().to_string()
    }

    /// Reply to messages nothing else handled
    pub fn fallback_text(&self) -> String {
        let mut text = String::from("Unknown command.\n\nThe main commands are:\n\n");
        for descriptor in self.descriptors.iter().filter(|d| d.important) {
            text.push_str(&format!(
                "{}\n  {}\n\n",
                descriptor.trigger, descriptor.description
            ));
        }
        text.trim_end().to_string()
    }

    /// Literal triggers flagged important, in registration order
    pub fn important_triggers(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| d.important)
            .filter_map(|d| match &d.trigger {
                Trigger::Exact(text) => Some(text.clone()),
                Trigger::Pattern(_) => None,
            })
            .collect()
    }

    /// Suggested replies once a chain is over
    pub fn menu(&self, ledger: Option<&LedgerHandle>) -> Keyboard {
        let labels = self
            .setup_check
            .as_ref()
            .and_then(|check| check(ledger))
            .unwrap_or_else(|| self.important_triggers());
        Keyboard::grid(labels, 2)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
