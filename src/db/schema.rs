//! Database schema and record types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS ledgers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chats (
    chat_id INTEGER PRIMARY KEY,
    ledger_id INTEGER NOT NULL,
    linked_at TEXT NOT NULL,

    FOREIGN KEY (ledger_id) REFERENCES ledgers(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ledger_id INTEGER NOT NULL,
    icon TEXT NOT NULL,
    name TEXT NOT NULL,

    FOREIGN KEY (ledger_id) REFERENCES ledgers(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ledger_id INTEGER NOT NULL,
    icon TEXT NOT NULL,
    name TEXT NOT NULL,

    FOREIGN KEY (ledger_id) REFERENCES ledgers(id) ON DELETE CASCADE
);

-- date is unix milliseconds (UTC)
CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ledger_id INTEGER NOT NULL,
    account_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    date INTEGER NOT NULL,
    description TEXT NOT NULL,

    FOREIGN KEY (ledger_id) REFERENCES ledgers(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_expenses_ledger_date ON expenses(ledger_id, date DESC);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ledger_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    value REAL NOT NULL,

    UNIQUE (ledger_id, category_id),
    FOREIGN KEY (ledger_id) REFERENCES ledgers(id) ON DELETE CASCADE
);
";

/// Bank account (or wallet) money is spent from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub icon: String,
    pub name: String,
}

/// Expense category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub icon: String,
    pub name: String,
}

impl Category {
    /// "icon name", as shown in listings and choice keyboards
    pub fn label(&self) -> String {
        format!("{} {}", self.icon, self.name)
    }
}

impl Account {
    pub fn label(&self) -> String {
        format!("{} {}", self.icon, self.name)
    }
}

/// Recorded expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub account_id: i64,
    pub category_id: i64,
    pub amount: f64,
    /// Unix milliseconds
    pub date: i64,
    pub description: String,
}

impl Expense {
    pub fn date_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.date)
            .single()
            .unwrap_or_default()
    }
}

/// Expense about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub account_id: i64,
    pub category_id: i64,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub description: String,
}

/// Monthly budget on a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub category_id: i64,
    pub value: f64,
}
