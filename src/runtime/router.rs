//! Inbound message routing
//!
//! Precedence for one message:
//! 1. `/cancel` disarms the pending slot
//! 2. an armed slot takes the raw message, whatever it says
//! 3. exact triggers, ignoring a trailing `@<bot username>`
//! 4. pattern triggers, in registration order
//! 5. the fallback listing of main commands
//!
//! The router itself holds no conversation state; callers pass in the
//! `ConversationState` of the conversation the message belongs to.

use super::traits::LedgerResolver;
use crate::chain::{
    ActiveChain, ChainEvent, Command, CommandAction, CommandRegistry, ConversationId, Finish,
    Progress, Reply, Signal, StepError,
};
use crate::db::LedgerHandle;
use std::sync::Arc;

pub const CANCEL_TRIGGER: &str = "/cancel";
pub const ALL_DONE: &str = "All done";
pub const CANCELLED: &str = "Cancelled.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";

/// Per-conversation routing state
#[derive(Default)]
pub struct ConversationState {
    /// Chain waiting for this conversation's next message
    pending: Option<Box<dyn ActiveChain>>,
}

impl ConversationState {
    pub fn is_awaiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Command of the armed chain and the step it waits on
    pub fn awaiting(&self) -> Option<(&str, usize)> {
        self.pending.as_ref().map(|c| (c.command(), c.cursor()))
    }
}

pub struct Router {
    registry: CommandRegistry,
    resolver: Arc<dyn LedgerResolver>,
    bot_username: Option<String>,
    events: Signal<ChainEvent>,
}

impl Router {
    pub fn new(registry: CommandRegistry, resolver: Arc<dyn LedgerResolver>) -> Self {
        Self {
            registry,
            resolver,
            bot_username: None,
            events: Signal::new(),
        }
    }

    /// Accept `/command@username` as `/command`
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn events(&self) -> &Signal<ChainEvent> {
        &self.events
    }

    /// Handle one inbound message and return the replies to send, in order
    pub async fn dispatch(
        &self,
        state: &mut ConversationState,
        conversation: ConversationId,
        text: &str,
    ) -> Vec<Reply> {
        let command_text = self.strip_addressing(text.trim());

        if command_text == CANCEL_TRIGGER {
            return self.cancel(state, conversation);
        }

        if let Some(mut chain) = state.pending.take() {
            let progress = chain.answer(text, &self.events).await;
            return self.settle(state, conversation, chain, progress);
        }

        let command = self
            .registry
            .exact(command_text)
            .or_else(|| self.registry.matching(text));

        match command {
            Some(command) => {
                self.activate(state, conversation, command_text, text, command)
                    .await
            }
            None => {
                tracing::debug!(%conversation, text, "No command matched");
                let menu = self.registry.menu(self.ledger(conversation).as_ref());
                vec![Reply::text(self.registry.fallback_text()).with_keyboard(menu)]
            }
        }
    }

    async fn activate(
        &self,
        state: &mut ConversationState,
        conversation: ConversationId,
        command_text: &str,
        raw: &str,
        command: &Command,
    ) -> Vec<Reply> {
        let ledger = match self.resolver.resolve(conversation) {
            Ok(ledger) => ledger,
            Err(e) => {
                tracing::error!(%conversation, error = %e, "Failed to resolve ledger");
                return vec![Reply::text(StepError::from(e).to_string())];
            }
        };

        let factory = match &command.action {
            CommandAction::Help => {
                let menu = self.registry.menu(ledger.as_ref());
                return vec![Reply::text(self.registry.help_text()).with_keyboard(menu)];
            }
            CommandAction::Chain(factory) => factory,
        };

        if command.requires_ledger && ledger.is_none() {
            tracing::debug!(%conversation, command = command_text, "Command needs a ledger");
            let menu = self.registry.menu(None);
            return vec![Reply::text(StepError::NoLedger.to_string()).with_keyboard(menu)];
        }

        // Pattern commands see the whole message; literal ones their trigger
        let activating = if self.registry.exact(command_text).is_some() {
            command_text
        } else {
            raw
        };

        let mut chain = factory.instantiate(conversation, activating, ledger);
        tracing::info!(%conversation, command = activating, "Chain started");
        self.events.emit(ChainEvent::Started {
            conversation,
            command: activating.to_string(),
        });
        let progress = chain.start(&self.events).await;
        self.settle(state, conversation, chain, progress)
    }

    fn cancel(&self, state: &mut ConversationState, conversation: ConversationId) -> Vec<Reply> {
        let Some(mut chain) = state.pending.take() else {
            return vec![Reply::text(NOTHING_TO_CANCEL)];
        };
        let mut replies = chain.take_replies();
        replies.push(Reply::text(CANCELLED));
        self.finish(conversation, chain.command(), Finish::Cancelled, &mut replies);
        replies
    }

    /// Re-arm the slot or render the terminal state
    fn settle(
        &self,
        state: &mut ConversationState,
        conversation: ConversationId,
        mut chain: Box<dyn ActiveChain>,
        progress: Progress,
    ) -> Vec<Reply> {
        let mut replies = chain.take_replies();
        match progress {
            Progress::Awaiting => state.pending = Some(chain),
            Progress::Finished(finish) => {
                self.finish(conversation, chain.command(), finish, &mut replies);
            }
        }
        replies
    }

    fn finish(
        &self,
        conversation: ConversationId,
        command: &str,
        finish: Finish,
        replies: &mut Vec<Reply>,
    ) {
        // Chains may have created the ledger, so look it up again
        let menu = self.registry.menu(self.ledger(conversation).as_ref());
        replies.push(Reply::text(ALL_DONE).with_keyboard(menu));

        tracing::info!(%conversation, command, finish = finish.as_str(), "Chain finished");
        self.events.emit(ChainEvent::Finished {
            conversation,
            command: command.to_string(),
            finish,
        });
    }

    fn ledger(&self, conversation: ConversationId) -> Option<LedgerHandle> {
        self.resolver
            .resolve(conversation)
            .inspect_err(|e| tracing::warn!(%conversation, error = %e, "Failed to resolve ledger"))
            .ok()
            .flatten()
    }

    fn strip_addressing<'t>(&self, text: &'t str) -> &'t str {
        let Some(username) = self.bot_username.as_deref() else {
            return text;
        };
        text.strip_suffix(username)
            .and_then(|rest| rest.strip_suffix('@'))
            .unwrap_or(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{proceed, Choice, StepOutcome, Trigger, INVALID_ANSWER};
    use crate::db::Database;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Pair {
        first: String,
        second: String,
    }

    fn conv() -> ConversationId {
        ConversationId(1)
    }

    fn texts(replies: &[Reply]) -> Vec<&str> {
        replies.iter().map(|r| r.text.as_str()).collect()
    }

    fn router_with(build: impl FnOnce(&mut CommandRegistry)) -> Router {
        let mut registry = CommandRegistry::new();
        build(&mut registry);
        let db = Database::open_in_memory().unwrap();
        Router::new(registry, Arc::new(db)).with_bot_username("tally_bot")
    }

    fn two_questions(registry: &mut CommandRegistry) {
        registry
            .register::<Pair>("/pair", "Asks two things", true)
            .free_text("First?", |acc, text| {
                acc.data.first = text;
                proceed()
            })
            .free_text("Second?", |acc, text| {
                acc.data.second = text;
                proceed()
            })
            .tap(|acc| {
                let summary = format!("{} and {}", acc.data.first, acc.data.second);
                acc.reply(summary);
                proceed()
            })
            .install()
            .unwrap();
    }

    #[tokio::test]
    async fn test_slot_takes_precedence_over_triggers() {
        let router = router_with(two_questions);
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "/pair").await;
        assert_eq!(texts(&replies), vec!["First?"]);
        assert_eq!(state.awaiting(), Some(("/pair", 0)));

        // A registered trigger is just an answer while the slot is armed
        let replies = router.dispatch(&mut state, conv(), "/help").await;
        assert_eq!(texts(&replies), vec!["Second?"]);

        let replies = router.dispatch(&mut state, conv(), "x").await;
        assert_eq!(texts(&replies), vec!["/help and x", ALL_DONE]);
        assert!(!state.is_awaiting());
    }

    #[tokio::test]
    async fn test_addressing_suffix_is_stripped() {
        let router = router_with(two_questions);
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "/pair@tally_bot").await;
        assert_eq!(texts(&replies), vec!["First?"]);

        let mut other = ConversationState::default();
        let replies = router.dispatch(&mut other, conv(), "/pair@someone_else").await;
        assert!(replies[0].text.starts_with("Unknown command."));
    }

    #[tokio::test]
    async fn test_cancel_disarms_slot_and_renders_terminal() {
        let router = router_with(two_questions);
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        router.events().subscribe(move |event| {
            if let ChainEvent::Finished { finish, .. } = event {
                assert_eq!(*finish, Finish::Cancelled);
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut state = ConversationState::default();
        router.dispatch(&mut state, conv(), "/pair").await;
        let replies = router.dispatch(&mut state, conv(), "/cancel").await;
        assert_eq!(texts(&replies), vec![CANCELLED, ALL_DONE]);
        assert!(!state.is_awaiting());
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        let replies = router.dispatch(&mut state, conv(), "/cancel").await;
        assert_eq!(texts(&replies), vec![NOTHING_TO_CANCEL]);
    }

    #[tokio::test]
    async fn test_help_lists_commands_in_order() {
        let router = router_with(two_questions);
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "/help").await;
        assert_eq!(replies.len(), 1);
        let help = &replies[0].text;
        let help_at = help.find("/help").unwrap();
        let pair_at = help.find("/pair").unwrap();
        assert!(help_at < pair_at);
        assert!(help.contains("Asks two things"));
    }

    #[tokio::test]
    async fn test_fallback_lists_main_commands() {
        let router = router_with(two_questions);
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "hello there").await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.starts_with("Unknown command."));
        assert!(replies[0].text.contains("/pair\n  Asks two things"));
        let menu = replies[0].keyboard.as_ref().unwrap();
        assert_eq!(menu.labels().collect::<Vec<_>>(), vec!["/help", "/pair"]);
    }

    #[tokio::test]
    async fn test_invalid_answer_keeps_step_armed() {
        let router = router_with(|registry| {
            registry
                .register::<u32>("/number", "Asks for a number", false)
                .free_text_parsed("Number?", |t| t.parse::<u32>().ok(), |acc, n| {
                    acc.data = n;
                    proceed()
                })
                .tap(|acc| {
                    let doubled = acc.data * 2;
                    acc.reply(doubled.to_string());
                    proceed()
                })
                .install()
                .unwrap();
        });
        let invalid = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invalid);
        router.events().subscribe(move |event| {
            if matches!(event, ChainEvent::InvalidAnswer { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut state = ConversationState::default();
        router.dispatch(&mut state, conv(), "/number").await;
        let replies = router.dispatch(&mut state, conv(), "twelve").await;
        assert_eq!(texts(&replies), vec![INVALID_ANSWER]);
        assert_eq!(state.awaiting(), Some(("/number", 0)));
        assert_eq!(invalid.load(Ordering::SeqCst), 1);

        let replies = router.dispatch(&mut state, conv(), "12").await;
        assert_eq!(texts(&replies), vec!["24", ALL_DONE]);
    }

    #[tokio::test]
    async fn test_confirm_only_yes_is_affirmative() {
        let router = router_with(|registry| {
            registry
                .register::<()>("/sure", "Asks for confirmation", false)
                .confirm("Sure?", |acc, yes| {
                    if yes {
                        acc.reply("Done.");
                        proceed()
                    } else {
                        acc.reply("Cancelled.");
                        Ok(StepOutcome::Abort)
                    }
                })
                .install()
                .unwrap();
        });
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "/sure").await;
        let keyboard = replies[0].keyboard.as_ref().unwrap();
        assert_eq!(keyboard.labels().collect::<Vec<_>>(), vec!["Yes", "No"]);

        let replies = router.dispatch(&mut state, conv(), "yes").await;
        assert_eq!(texts(&replies), vec!["Cancelled.", ALL_DONE]);

        router.dispatch(&mut state, conv(), "/sure").await;
        let replies = router.dispatch(&mut state, conv(), "Yes").await;
        assert_eq!(texts(&replies), vec!["Done.", ALL_DONE]);
    }

    #[tokio::test]
    async fn test_declined_confirm_skips_remaining_steps() {
        let tap_runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&tap_runs);
        let router = router_with(move |registry| {
            registry
                .register::<String>("/name", "Names something", false)
                .free_text("Name?", |acc, text| {
                    acc.data = text;
                    proceed()
                })
                .confirm("Keep it?", |_, yes| {
                    Ok(if yes {
                        StepOutcome::Continue
                    } else {
                        StepOutcome::Abort
                    })
                })
                .tap(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    proceed()
                })
                .install()
                .unwrap();
        });
        let finishes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&finishes);
        router.events().subscribe(move |event| {
            if let ChainEvent::Finished { finish, .. } = event {
                recorded.lock().unwrap().push(finish.clone());
            }
        });
        let mut state = ConversationState::default();

        router.dispatch(&mut state, conv(), "/name").await;
        assert_eq!(
            texts(&router.dispatch(&mut state, conv(), "Rex").await),
            vec!["Keep it?"]
        );
        let replies = router.dispatch(&mut state, conv(), "No").await;

        assert_eq!(texts(&replies), vec![ALL_DONE]);
        assert_eq!(tap_runs.load(Ordering::SeqCst), 0);
        assert!(!state.is_awaiting());
        assert_eq!(*finishes.lock().unwrap(), vec![Finish::Aborted]);
    }

    #[tokio::test]
    async fn test_choice_resolution() {
        let router = router_with(|registry| {
            registry
                .register::<String>("/pick", "Picks one", false)
                .choice_in_columns(
                    "Which one?",
                    2,
                    |_| Ok(vec![Choice::new("Red", 1), Choice::new("Blue", 2)]),
                    |acc, payload| {
                        acc.data = payload;
                        proceed()
                    },
                )
                .tap(|acc| {
                    let picked = format!("Picked {}", acc.data);
                    acc.reply(picked);
                    proceed()
                })
                .install()
                .unwrap();
            registry
                .register::<()>("/only", "Only one option", false)
                .choice("Which one?", |_| Ok(vec![Choice::new("Green", 3)]), |acc, payload| {
                    acc.reply(format!("Got {payload}"));
                    proceed()
                })
                .install()
                .unwrap();
            registry
                .register::<()>("/none", "No options", false)
                .choice("Which one?", |_| Ok(Vec::new()), |_, _| proceed())
                .install()
                .unwrap();
        });
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "/pick").await;
        let keyboard = replies[0].keyboard.as_ref().unwrap();
        assert_eq!(keyboard.rows, vec![vec!["Red".to_string(), "Blue".to_string()]]);
        assert!(keyboard.one_time);

        let replies = router.dispatch(&mut state, conv(), "Purple").await;
        assert_eq!(texts(&replies), vec![INVALID_ANSWER]);
        let replies = router.dispatch(&mut state, conv(), "Blue").await;
        assert_eq!(texts(&replies), vec!["Picked 2", ALL_DONE]);

        let replies = router.dispatch(&mut state, conv(), "/only").await;
        assert_eq!(
            texts(&replies),
            vec!["Which one?", "Green selected.", "Got 3", ALL_DONE]
        );

        let replies = router.dispatch(&mut state, conv(), "/none").await;
        assert_eq!(texts(&replies), vec!["No options available.", ALL_DONE]);
        assert!(!state.is_awaiting());
    }

    #[tokio::test]
    async fn test_guard_failure_stops_chain() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_chain = Arc::clone(&ran);
        let router = router_with(move |registry| {
            registry
                .register::<()>("/guarded", "Always refuses", false)
                .guard(|_| Err(StepError::guard("Not now.")))
                .tap(move |_| {
                    ran_in_chain.fetch_add(1, Ordering::SeqCst);
                    proceed()
                })
                .install()
                .unwrap();
        });
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "/guarded").await;
        assert_eq!(texts(&replies), vec!["Not now.", ALL_DONE]);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_requires_ledger_blocks_activation() {
        let router = router_with(|registry| {
            registry
                .register::<()>("/ledgered", "Needs a ledger", false)
                .requires_ledger()
                .tap(|acc| {
                    acc.ledger()?;
                    proceed()
                })
                .install()
                .unwrap();
        });
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        router.events().subscribe(move |event| {
            if matches!(event, ChainEvent::Started { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "/ledgered").await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.contains("/start"));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pattern_chain_sees_whole_message() {
        let router = router_with(|registry| {
            registry
                .register::<()>(Trigger::pattern(r"^\d+ \w+$").unwrap(), "Quick entry", false)
                .tap(|acc| {
                    let echoed = format!("Got '{}'", acc.command);
                    acc.reply(echoed);
                    proceed()
                })
                .install()
                .unwrap();
        });
        let mut state = ConversationState::default();

        let replies = router.dispatch(&mut state, conv(), "12 lunch").await;
        assert_eq!(texts(&replies), vec!["Got '12 lunch'", ALL_DONE]);
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let router = router_with(two_questions);
        let mut alice = ConversationState::default();
        let mut bob = ConversationState::default();

        router.dispatch(&mut alice, ConversationId(1), "/pair").await;
        let replies = router.dispatch(&mut bob, ConversationId(2), "a").await;
        assert!(replies[0].text.starts_with("Unknown command."));
        assert!(alice.is_awaiting());
        assert!(!bob.is_awaiting());
    }
}
