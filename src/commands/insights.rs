//! `/insights`: free-form questions about this month's spending

use crate::chain::{proceed, CommandRegistry, RegistryError, StepError};
use crate::completion::{CompletionMessage, CompletionService};
use crate::db::{Account, Category, Expense};
use crate::report::{self, format_amount};
use chrono::Utc;
use futures::FutureExt;
use std::sync::Arc;

const NOT_CONFIGURED: &str = "Insights are not available: no assistant is configured.";

const SYSTEM_PROMPT: &str = "You are a personal finance assistant inside a chat. \
Answer the user's question using only the expenses listed below. Amounts are in euros. \
Be brief and concrete, and answer in plain text without markdown.";

#[derive(Debug, Default)]
struct Insight {
    question: String,
}

pub fn register(
    registry: &mut CommandRegistry,
    completion: Option<Arc<dyn CompletionService>>,
) -> Result<(), RegistryError> {
    let configured = completion.is_some();
    registry
        .register::<Insight>("/insights", "Ask the assistant about this month's spending", false)
        .requires_ledger()
        .guard(move |_| {
            if configured {
                Ok(())
            } else {
                Err(StepError::guard(NOT_CONFIGURED))
            }
        })
        .free_text("What would you like to know about your spending?", |acc, question| {
            acc.data.question = question;
            proceed()
        })
        .tap_async(move |acc| {
            let completion = completion.clone();
            async move {
                let Some(completion) = completion else {
                    return Err(StepError::guard(NOT_CONFIGURED));
                };
                let messages = {
                    let ledger = acc.ledger()?;
                    let now = Utc::now();
                    let expenses = ledger.expenses(Some(report::start_of_month(now)), now)?;
                    prompt(
                        &acc.data.question,
                        &expenses,
                        &ledger.accounts()?,
                        &ledger.categories()?,
                    )
                };
                let answer = completion.complete(&messages).await?;
                acc.reply(answer);
                proceed()
            }
            .boxed()
        })
        .install()
}

fn prompt(
    question: &str,
    expenses: &[Expense],
    accounts: &[Account],
    categories: &[Category],
) -> Vec<CompletionMessage> {
    let lines: Vec<String> = expenses
        .iter()
        .map(|e| {
            let category = categories
                .iter()
                .find(|c| c.id == e.category_id)
                .map_or("unknown category", |c| c.name.as_str());
            let account = accounts
                .iter()
                .find(|a| a.id == e.account_id)
                .map_or("unknown account", |a| a.name.as_str());
            format!(
                "{} | {} | {}€ | {} | {}",
                e.date_time().format("%Y-%m-%d"),
                e.description,
                format_amount(e.amount),
                category,
                account
            )
        })
        .collect();

    let listing = if lines.is_empty() {
        "(no expenses recorded this month)".to_string()
    } else {
        lines.join("\n")
    };

    vec![
        CompletionMessage::system(SYSTEM_PROMPT),
        CompletionMessage::user(format!(
            "Expenses this month (date | title | amount | category | account):\n{listing}\n\nQuestion: {question}"
        )),
    ]
}
