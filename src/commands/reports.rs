//! Read-only expense reports, rendered as `MarkdownV2`

use crate::chain::{proceed, CommandRegistry, RegistryError};
use crate::db::{Category, Expense};
use crate::report;
use chrono::{DateTime, Utc};

const LAST_EXPENSES: usize = 100;

type Render = fn(&[Expense], &[Category], DateTime<Utc>) -> String;

pub fn register(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    register_report(
        registry,
        "/get_last_expenses",
        "Get the last 100 expenses",
        true,
        false,
        |expenses, categories, _| {
            let last = &expenses[..expenses.len().min(LAST_EXPENSES)];
            report::expense_listing(last, categories)
        },
    )?;
    register_report(
        registry,
        "/get_biggest_expenses",
        "Get biggest expenses for each month",
        false,
        true,
        report::biggest_expenses,
    )?;
    register_report(
        registry,
        "/get_expenses_by_category",
        "Get expenses by category",
        true,
        true,
        report::expenses_by_category,
    )
}

/// `recent_only` limits the query to the months the monthly reports cover
fn register_report(
    registry: &mut CommandRegistry,
    trigger: &str,
    description: &str,
    important: bool,
    recent_only: bool,
    render: Render,
) -> Result<(), RegistryError> {
    registry
        .register::<()>(trigger, description, important)
        .requires_ledger()
        .tap(move |acc| {
            let now = Utc::now();
            let from = recent_only.then(|| report::report_start(now));
            let text = {
                let ledger = acc.ledger()?;
                render(&ledger.expenses(from, now)?, &ledger.categories()?, now)
            };
            acc.reply_markdown(text);
            proceed()
        })
        .install()
}
