//! Recording, removing and re-dating expenses

use super::{account_choices, category_choices, parse_id, require_accounts_and_categories};
use crate::chain::{
    proceed, Accumulator, Choice, CommandRegistry, RegistryError, StepError, StepOutcome,
    StepResult, Trigger,
};
use crate::db::{LedgerHandle, NewExpense};
use crate::report::{self, format_expense, month_name, parse_amount};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;

/// Expenses offered by the pick-an-expense commands
const RECENT_LIMIT: usize = 100;

/// `12.50 lunch`
pub const QUICK_ENTRY_PATTERN: &str = r"^\s*(\d+(?:[.,]\d+)?)\s+(\S.*?)\s*$";

#[derive(Debug, Default)]
struct ExpenseDraft {
    account_id: i64,
    category_id: i64,
    amount: f64,
    title: String,
}

#[derive(Debug, Default)]
struct DateChange {
    expense_id: i64,
    year: i32,
    month: u32,
    day: u32,
}

pub fn register(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    registry
        .register::<ExpenseDraft>("/add_expense", "Spend money", true)
        .requires_ledger()
        .guard(require_accounts_and_categories)
        .choice_in_columns("Which account?", 2, account_choices, pick_account)
        .choice_in_columns("Which category?", 2, category_choices, pick_category)
        .free_text_parsed("How much did you spend?", parse_amount, |acc, amount| {
            acc.data.amount = amount;
            proceed()
        })
        .free_text("Title?", |acc, title| {
            acc.data.title = title;
            proceed()
        })
        .tap(record_expense)
        .install()?;

    registry
        .register::<()>("/remove_expense", "Remove an expense", false)
        .requires_ledger()
        .choice("Which expense?", recent_expense_choices, |acc, payload| {
            let removed = acc.ledger()?.remove_expense(parse_id(&payload)?)?;
            acc.reply(if removed {
                "Expense removed."
            } else {
                "That expense no longer exists."
            });
            proceed()
        })
        .install()?;

    registry
        .register::<DateChange>("/change_expense_date", "Change the date of an expense", false)
        .requires_ledger()
        .choice("Which expense?", recent_expense_choices, |acc, payload| {
            acc.data.expense_id = parse_id(&payload)?;
            proceed()
        })
        .choice_in_columns("Which year?", 2, |_| Ok(year_choices(Utc::now())), |acc, payload| {
            acc.data.year = payload
                .parse()
                .map_err(|_| StepError::guard("Invalid year."))?;
            proceed()
        })
        .choice_in_columns("Which month?", 3, |_| Ok(month_choices()), |acc, payload| {
            acc.data.month = payload
                .parse()
                .map_err(|_| StepError::guard("Invalid month."))?;
            proceed()
        })
        .choice_in_columns("Which day?", 3, |_| Ok(day_choices()), |acc, payload| {
            acc.data.day = payload
                .parse()
                .map_err(|_| StepError::guard("Invalid day."))?;
            proceed()
        })
        .tap(change_date)
        .install()
}

/// `<amount> <title>` typed straight into the chat
pub fn register_quick_entry(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    registry
        .register::<ExpenseDraft>(
            Trigger::pattern(QUICK_ENTRY_PATTERN)?,
            "Quick entry: type an amount and a title, like \"12.50 lunch\"",
            false,
        )
        .requires_ledger()
        .guard(require_accounts_and_categories)
        .tap(|acc| {
            let Some((amount, title)) = parse_quick_entry(&acc.command) else {
                return Ok(StepOutcome::Fail("Please type an amount followed by a title.".to_string()));
            };
            acc.data.amount = amount;
            acc.data.title = title;
            proceed()
        })
        .choice_in_columns("Which account?", 2, account_choices, pick_account)
        .choice_in_columns("Which category?", 2, category_choices, pick_category)
        .tap(record_expense)
        .install()
}

fn parse_quick_entry(text: &str) -> Option<(f64, String)> {
    let pattern = Regex::new(QUICK_ENTRY_PATTERN).ok()?;
    let captures = pattern.captures(text)?;
    let amount = parse_amount(captures.get(1)?.as_str())?;
    Some((amount, captures.get(2)?.as_str().to_string()))
}

fn pick_account(acc: &mut Accumulator<ExpenseDraft>, payload: String) -> StepResult {
    acc.data.account_id = parse_id(&payload)?;
    proceed()
}

fn pick_category(acc: &mut Accumulator<ExpenseDraft>, payload: String) -> StepResult {
    acc.data.category_id = parse_id(&payload)?;
    proceed()
}

fn record_expense(acc: &mut Accumulator<ExpenseDraft>) -> StepResult {
    let ledger = acc.ledger()?.clone();
    let now = Utc::now();
    let expense = ledger.add_expense(&NewExpense {
        account_id: acc.data.account_id,
        category_id: acc.data.category_id,
        amount: acc.data.amount,
        date: now,
        description: acc.data.title.clone(),
    })?;
    tracing::info!(
        conversation = %acc.conversation,
        expense_id = expense.id,
        "Expense recorded"
    );
    acc.reply("Expense added.");

    if let Some(usage) = budget_usage(&ledger, acc.data.category_id, now)? {
        acc.reply(usage);
    }
    proceed()
}

/// This month's consumption of the category's budget, when it has one
fn budget_usage(
    ledger: &LedgerHandle,
    category_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<String>, StepError> {
    let Some(budget) = ledger.budget_for(category_id)? else {
        return Ok(None);
    };
    let Some(category) = ledger
        .categories()?
        .into_iter()
        .find(|c| c.id == category_id)
    else {
        return Ok(None);
    };
    let spent = ledger
        .spent_by_category(report::start_of_month(now), now)?
        .get(&category_id)
        .copied()
        .unwrap_or(0.0);
    Ok(Some(report::budget_usage(spent, &category, &budget)))
}

fn recent_expense_choices<C>(acc: &Accumulator<C>) -> Result<Vec<Choice>, StepError> {
    let ledger = acc.ledger()?;
    let categories = ledger.categories()?;
    Ok(ledger
        .expenses(None, Utc::now())?
        .into_iter()
        .take(RECENT_LIMIT)
        .map(|e| Choice::new(format_expense(&e, &categories), e.id))
        .collect())
}

fn year_choices(now: DateTime<Utc>) -> Vec<Choice> {
    vec![
        Choice::new("Last year", now.year() - 1),
        Choice::new("This year", now.year()),
    ]
}

fn month_choices() -> Vec<Choice> {
    (1..=12).map(|m| Choice::new(month_name(m), m)).collect()
}

fn day_choices() -> Vec<Choice> {
    (1..=31).map(|d| Choice::new(d.to_string(), d)).collect()
}

fn change_date(acc: &mut Accumulator<DateChange>) -> StepResult {
    let DateChange {
        expense_id,
        year,
        month,
        day,
    } = acc.data;
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return Ok(StepOutcome::Fail("That date does not exist.".to_string()));
    };

    if acc.ledger()?.change_expense_date(expense_id, date.and_utc())? {
        acc.reply("Expense date changed.");
    } else {
        acc.reply("That expense no longer exists.");
    }
    proceed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{bot, bot_with_basics};
    use crate::chain::INVALID_ANSWER;
    use crate::runtime::testing::{TestBot, TEST_CHAT};
    use crate::runtime::ALL_DONE;

    fn ledger(bot: &TestBot) -> LedgerHandle {
        bot.db.ledger_for_chat(TEST_CHAT.0).unwrap().unwrap()
    }

    #[test]
    fn test_parse_quick_entry() {
        let (amount, title) = parse_quick_entry("12,50 lunch with Bob ").unwrap();
        assert_eq!(report::format_amount(amount), "12.5");
        assert_eq!(title, "lunch with Bob");
        assert!(parse_quick_entry("lunch 12").is_none());
        assert!(parse_quick_entry("12").is_none());
    }

    #[tokio::test]
    async fn test_add_expense_needs_accounts_and_categories() {
        let mut bot = bot().with_ledger();
        assert_eq!(
            bot.texts("/add_expense").await,
            vec![report::NO_ACCOUNTS, ALL_DONE]
        );

        ledger(&bot).add_account("💳", "Card").unwrap();
        assert_eq!(
            bot.texts("/add_expense").await,
            vec![report::NO_CATEGORIES, ALL_DONE]
        );
        assert!(!bot.is_awaiting(TEST_CHAT));
    }

    #[tokio::test]
    async fn test_add_expense_with_budget() {
        let mut bot = bot_with_basics();
        let ledger = ledger(&bot);
        ledger.add_account("💶", "Cash").unwrap();
        let food = ledger.categories().unwrap().remove(0);
        ledger.set_budget(food.id, 200.0).unwrap();

        let replies = bot.send("/add_expense").await;
        assert_eq!(replies[0].text, "Which account?");
        let keyboard = replies[0].keyboard.as_ref().unwrap();
        assert_eq!(keyboard.rows, vec![vec!["💳 Card".to_string(), "💶 Cash".to_string()]]);

        // Only one category: picked without asking
        assert_eq!(
            bot.texts("💶 Cash").await,
            vec!["Which category?", "🍔 Food selected.", "How much did you spend?"]
        );
        assert_eq!(bot.texts("a lot").await, vec![INVALID_ANSWER]);
        assert_eq!(bot.texts("50").await, vec!["Title?"]);
        assert_eq!(
            bot.texts("groceries").await,
            vec![
                "Expense added.",
                "You've spent 50€ in Food for this month, which is 25.00% of your monthly budget.",
                ALL_DONE,
            ]
        );

        let expenses = ledger.expenses(None, Utc::now()).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].description, "groceries");
        assert_eq!(expenses[0].account_id, ledger.accounts().unwrap()[1].id);
    }

    #[tokio::test]
    async fn test_quick_entry() {
        let mut bot = bot_with_basics();

        assert_eq!(
            bot.texts("12.50 lunch").await,
            vec![
                "Which account?",
                "💳 Card selected.",
                "Which category?",
                "🍔 Food selected.",
                "Expense added.",
                ALL_DONE,
            ]
        );
        let expenses = ledger(&bot).expenses(None, Utc::now()).unwrap();
        assert_eq!(expenses[0].description, "lunch");
        assert_eq!(report::format_amount(expenses[0].amount), "12.5");
    }

    #[tokio::test]
    async fn test_remove_expense() {
        let mut bot = bot_with_basics();
        bot.send("3 coffee").await;
        let label = {
            let ledger = ledger(&bot);
            let expense = ledger.expenses(None, Utc::now()).unwrap().remove(0);
            format_expense(&expense, &ledger.categories().unwrap())
        };

        // A single expense is selected straight away
        assert_eq!(
            bot.texts("/remove_expense").await,
            vec![
                "Which expense?".to_string(),
                format!("{label} selected."),
                "Expense removed.".to_string(),
                ALL_DONE.to_string(),
            ]
        );
        assert!(ledger(&bot).expenses(None, Utc::now()).unwrap().is_empty());

        assert_eq!(
            bot.texts("/remove_expense").await,
            vec!["No options available.", ALL_DONE]
        );
    }

    #[tokio::test]
    async fn test_change_expense_date() {
        let mut bot = bot_with_basics();
        bot.send("3 coffee").await;
        let this_year = Utc::now().year();

        let replies = bot.send("/change_expense_date").await;
        assert_eq!(replies.last().unwrap().text, "Which year?");
        bot.send("Last year").await;
        let replies = bot.send("February").await;
        assert_eq!(replies[0].text, "Which day?");
        assert_eq!(replies[0].keyboard.as_ref().unwrap().rows[0].len(), 3);

        assert_eq!(
            bot.texts("31").await,
            vec!["That date does not exist.", ALL_DONE]
        );

        bot.send("/change_expense_date").await;
        bot.send("Last year").await;
        bot.send("March").await;
        assert_eq!(bot.texts("5").await, vec!["Expense date changed.", ALL_DONE]);

        let expense = ledger(&bot).expenses(None, Utc::now()).unwrap().remove(0);
        assert_eq!(
            expense.date_time().date_naive(),
            NaiveDate::from_ymd_opt(this_year - 1, 3, 5).unwrap()
        );
    }
}
