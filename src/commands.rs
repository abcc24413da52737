//! Expense-tracking commands wired onto the chain engine

mod budgets;
mod catalog;
mod expenses;
mod insights;
mod ledger;
mod reports;

use crate::chain::{Accumulator, Choice, CommandRegistry, RegistryError, StepError};
use crate::completion::CompletionService;
use crate::db::{Database, LedgerHandle};
use crate::report::{NO_ACCOUNTS, NO_CATEGORIES};
use std::sync::Arc;

/// Collaborators the commands close over
#[derive(Clone)]
pub struct CommandDeps {
    pub db: Database,
    pub completion: Option<Arc<dyn CompletionService>>,
}

impl CommandDeps {
    pub fn new(db: Database, completion: Option<Arc<dyn CompletionService>>) -> Self {
        Self { db, completion }
    }
}

/// Register every command, in the order they are listed by `/help`
pub fn register_all(registry: &mut CommandRegistry, deps: &CommandDeps) -> Result<(), RegistryError> {
    registry.set_setup_check(setup_commands);

    ledger::register(registry, &deps.db)?;
    catalog::register(registry)?;
    expenses::register(registry)?;
    budgets::register(registry)?;
    reports::register(registry)?;
    insights::register(registry, deps.completion.clone())?;
    expenses::register_quick_entry(registry)?;

    tracing::info!(commands = registry.descriptors().len(), "Commands registered");
    Ok(())
}

/// Commands still needed before expenses can be recorded, if any
fn setup_commands(ledger: Option<&LedgerHandle>) -> Option<Vec<String>> {
    let Some(ledger) = ledger else {
        return Some(vec![ledger::START.to_string()]);
    };

    let mut missing = Vec::new();
    match ledger.accounts() {
        Ok(accounts) if accounts.is_empty() => missing.push(catalog::ADD_ACCOUNT.to_string()),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to list accounts for the menu"),
    }
    match ledger.categories() {
        Ok(categories) if categories.is_empty() => missing.push(catalog::ADD_CATEGORY.to_string()),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to list categories for the menu"),
    }

    (!missing.is_empty()).then_some(missing)
}

// ============================================================================
// Shared step pieces
// ============================================================================

fn account_choices<C>(acc: &Accumulator<C>) -> Result<Vec<Choice>, StepError> {
    Ok(acc
        .ledger()?
        .accounts()?
        .into_iter()
        .map(|a| Choice::new(a.label(), a.id))
        .collect())
}

fn category_choices<C>(acc: &Accumulator<C>) -> Result<Vec<Choice>, StepError> {
    Ok(acc
        .ledger()?
        .categories()?
        .into_iter()
        .map(|c| Choice::new(c.label(), c.id))
        .collect())
}

/// Halts unless the ledger has at least one account and one category
fn require_accounts_and_categories<C>(acc: &mut Accumulator<C>) -> Result<(), StepError> {
    let ledger = acc.ledger()?;
    if ledger.accounts()?.is_empty() {
        return Err(StepError::guard(NO_ACCOUNTS));
    }
    require_categories(acc)
}

fn require_categories<C>(acc: &mut Accumulator<C>) -> Result<(), StepError> {
    if acc.ledger()?.categories()?.is_empty() {
        return Err(StepError::guard(NO_CATEGORIES));
    }
    Ok(())
}

/// Choice payloads are ids rendered by this module
fn parse_id(payload: &str) -> Result<i64, StepError> {
    payload
        .parse()
        .map_err(|_| StepError::guard("Invalid selection."))
}
