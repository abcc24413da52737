//! Text rendering for expenses, budgets and monthly reports
//!
//! Everything here is pure: callers pass in store records and the current
//! time, which keeps the month arithmetic testable.

use crate::db::{Account, Budget, Category, Expense};
use chrono::{DateTime, Datelike, Month, Months, NaiveDate, Utc};
use std::collections::HashMap;

/// Months covered by the monthly reports, not counting the current one
pub const MONTHS_TO_SHOW: u32 = 3;

pub const NO_ACCOUNTS: &str = "No accounts yet...\nUse /add_account to add one.";
pub const NO_CATEGORIES: &str = "No categories yet...\nUse /add_category to add one.";
pub const NO_BUDGETS: &str = "No budgets yet...\nUse /set_budget to add one.";
pub const NO_EXPENSES: &str = "No expenses yet...\nUse /add_expense to add one.";

/// Characters with a meaning in Telegram `MarkdownV2`
const MARKDOWN_SPECIAL: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
    '!',
];

pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Amount rounded to cents, without trailing zeros
pub fn format_amount(amount: f64) -> String {
    let rounded = (amount * 100.0).round() / 100.0;
    format!("{rounded}")
}

/// Parse a user-typed amount; accepts a decimal comma
pub fn parse_amount(text: &str) -> Option<f64> {
    let amount: f64 = text.trim().replace(',', ".").parse().ok()?;
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

/// `2024-03-05 🍔 lunch 12.5€`
pub fn format_expense(expense: &Expense, categories: &[Category]) -> String {
    let icon = categories
        .iter()
        .find(|c| c.id == expense.category_id)
        .map_or("?", |c| c.icon.as_str());
    format!(
        "{} {} {} {}€",
        expense.date_time().format("%Y-%m-%d"),
        icon,
        expense.description,
        format_amount(expense.amount)
    )
}

pub fn account_list(accounts: &[Account]) -> String {
    if accounts.is_empty() {
        return NO_ACCOUNTS.to_string();
    }
    accounts
        .iter()
        .map(Account::label)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn category_list(categories: &[Category]) -> String {
    if categories.is_empty() {
        return NO_CATEGORIES.to_string();
    }
    categories
        .iter()
        .map(Category::label)
        .collect::<Vec<_>>()
        .join("\n")
}

fn percentage(spent: f64, budget: f64) -> f64 {
    if budget > 0.0 {
        spent / budget * 100.0
    } else {
        0.0
    }
}

/// Sentence appended after recording an expense in a budgeted category
pub fn budget_usage(spent: f64, category: &Category, budget: &Budget) -> String {
    format!(
        "You've spent {}€ in {} for this month, which is {:.2}% of your monthly budget.",
        format_amount(spent),
        category.name,
        percentage(spent, budget.value)
    )
}

/// One block per budget with this month's consumption
pub fn budget_overview(
    budgets: &[Budget],
    categories: &[Category],
    spent: &HashMap<i64, f64>,
) -> String {
    let blocks: Vec<String> = budgets
        .iter()
        .filter_map(|budget| {
            let category = categories.iter().find(|c| c.id == budget.category_id)?;
            let used = spent.get(&budget.category_id).copied().unwrap_or(0.0);
            Some(format!(
                "{}€ - {}\n    {:.2}% used for this month",
                format_amount(budget.value),
                category.label(),
                percentage(used, budget.value)
            ))
        })
        .collect();

    if blocks.is_empty() {
        NO_BUDGETS.to_string()
    } else {
        blocks.join("\n\n")
    }
}

/// `MarkdownV2` listing of `expenses`, one per line
pub fn expense_listing(expenses: &[Expense], categories: &[Category]) -> String {
    if expenses.is_empty() {
        return escape_markdown(NO_EXPENSES);
    }
    expenses
        .iter()
        .map(|e| escape_markdown(&format_expense(e, categories)))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Months
// ============================================================================

/// Midnight UTC on the first day of `now`'s month
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(now, |d| d.and_utc())
}

/// Start of the oldest month covered by the monthly reports
pub fn report_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let month = start_of_month(now);
    month
        .checked_sub_months(Months::new(MONTHS_TO_SHOW))
        .unwrap_or(month)
}

/// English name of a month, 1-based
pub fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map_or("?", |m| m.name())
}

/// Calendar months `[start, end)` from `report_start(now)` through `now`'s month
fn report_months(now: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut months = Vec::new();
    let mut start = report_start(now);
    while start < now {
        let Some(end) = start.checked_add_months(Months::new(1)) else {
            break;
        };
        months.push((start, end));
        start = end;
    }
    months
}

fn in_month(expense: &Expense, (start, end): (DateTime<Utc>, DateTime<Utc>)) -> bool {
    let date = expense.date_time();
    date >= start && date < end
}

fn month_header(start: DateTime<Utc>) -> String {
    format!("__{}__ :", month_name(start.month()))
}

/// Each recent month's expenses, biggest first, as `MarkdownV2`
pub fn biggest_expenses(expenses: &[Expense], categories: &[Category], now: DateTime<Utc>) -> String {
    let mut sections = Vec::new();
    for month in report_months(now) {
        let mut monthly: Vec<&Expense> = expenses.iter().filter(|e| in_month(e, month)).collect();
        monthly.sort_by(|a, b| b.amount.total_cmp(&a.amount));

        let mut section = month_header(month.0);
        for expense in monthly {
            section.push('\n');
            section.push_str(&escape_markdown(&format_expense(expense, categories)));
        }
        sections.push(section);
    }
    sections.join("\n\n")
}

/// Each recent month's total per category, as `MarkdownV2`
pub fn expenses_by_category(
    expenses: &[Expense],
    categories: &[Category],
    now: DateTime<Utc>,
) -> String {
    let mut sections = Vec::new();
    for month in report_months(now) {
        let mut section = month_header(month.0);
        for category in categories {
            let total: f64 = expenses
                .iter()
                .filter(|e| e.category_id == category.id && in_month(e, month))
                .map(|e| e.amount)
                .sum();
            if total > 0.0 {
                let line = format!("{} : {}€", category.label(), format_amount(total));
                section.push('\n');
                section.push_str(&escape_markdown(&line));
            }
        }
        sections.push(section);
    }
    sections.join("\n\n")
}
