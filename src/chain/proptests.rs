//! Property-based tests for the chain engine
//!
//! These tests verify key invariants hold across arbitrary registrations and
//! answers.

use super::*;
use crate::db::Database;
use crate::runtime::{ConversationState, Router, ALL_DONE};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

// ============================================================================
// Test Helpers
// ============================================================================

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn router(registry: CommandRegistry) -> Router {
    Router::new(registry, Arc::new(Database::open_in_memory().unwrap()))
}

/// Chain of `steps` free-text questions recording answers in order
fn questions(steps: usize, seen: Arc<Mutex<Vec<(usize, String)>>>) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    let mut builder = registry.register::<()>("/ask", "Asks questions", false);
    for index in 0..steps {
        let seen = Arc::clone(&seen);
        builder = builder.free_text(format!("Question {index}"), move |_, text| {
            seen.lock().unwrap().push((index, text));
            proceed()
        });
    }
    builder.install().unwrap();
    registry
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_trigger() -> impl Strategy<Value = String> {
    "[a-z]{1,6}".prop_map(|name| format!("/{name}"))
}

/// Answers, including ones that look like commands
fn arb_answer() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,12}",
        Just("/help".to_string()),
        Just("/ask".to_string()),
        Just(YES.to_string()),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_help_lists_first_registration_of_each_trigger(
        triggers in proptest::collection::vec(arb_trigger(), 0..12)
    ) {
        let mut registry = CommandRegistry::new();
        let mut expected = vec![HELP_TRIGGER.to_string()];
        for trigger in &triggers {
            let result = registry
                .register::<()>(trigger.as_str(), "d", false)
                .tap(|_| proceed())
                .install();
            if expected.contains(trigger) {
                prop_assert!(matches!(result, Err(RegistryError::Duplicate(_))));
            } else {
                prop_assert!(result.is_ok());
                expected.push(trigger.clone());
            }
        }

        let listed: Vec<String> = registry
            .descriptors()
            .iter()
            .map(|d| d.trigger.to_string())
            .collect();
        prop_assert_eq!(&listed, &expected);
        let unique: HashSet<&String> = listed.iter().collect();
        prop_assert_eq!(unique.len(), listed.len());
    }

    #[test]
    fn prop_confirm_only_accepts_exact_yes(answer in arb_answer()) {
        let outcome = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&outcome);
        let mut registry = CommandRegistry::new();
        registry
            .register::<()>("/sure", "Confirms", false)
            .confirm("Sure?", move |_, yes| {
                *recorded.lock().unwrap() = Some(yes);
                proceed()
            })
            .install()
            .unwrap();
        let router = router(registry);

        block_on(async {
            let mut state = ConversationState::default();
            router.dispatch(&mut state, ConversationId(1), "/sure").await;
            router.dispatch(&mut state, ConversationId(1), &answer).await;
        });

        prop_assert_eq!(*outcome.lock().unwrap(), Some(answer == YES));
    }

    #[test]
    fn prop_steps_run_once_in_order_and_finish_once(
        answers in proptest::collection::vec(arb_answer(), 1..6)
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let router = router(questions(answers.len(), Arc::clone(&seen)));
        let finished = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&finished);
        router.events().subscribe(move |event| {
            if event.is_finished() {
                *counter.lock().unwrap() += 1;
            }
        });

        let last = block_on(async {
            let mut state = ConversationState::default();
            router.dispatch(&mut state, ConversationId(1), "/ask").await;
            let mut last = Vec::new();
            for answer in &answers {
                last = router.dispatch(&mut state, ConversationId(1), answer).await;
            }
            last
        });

        let expected: Vec<(usize, String)> = answers.iter().cloned().enumerate().collect();
        prop_assert_eq!(&*seen.lock().unwrap(), &expected);
        prop_assert_eq!(*finished.lock().unwrap(), 1);
        prop_assert_eq!(last.last().map(|r| r.text.as_str()), Some(ALL_DONE));
    }

    #[test]
    fn prop_signal_notifies_in_subscription_order(subscribers in 0usize..8, value in any::<i32>()) {
        let signal = Signal::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for index in 0..subscribers {
            let calls = Arc::clone(&calls);
            signal.subscribe(move |v: &i32| calls.lock().unwrap().push((index, *v)));
        }

        signal.emit(value);

        let expected: Vec<(usize, i32)> = (0..subscribers).map(|i| (i, value)).collect();
        prop_assert_eq!(&*calls.lock().unwrap(), &expected);
        prop_assert_eq!(signal.value(), Some(value));
    }
}
