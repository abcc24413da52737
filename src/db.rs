//! Database module for the expense ledger
//!
//! Every chat is linked to one ledger; all records hang off a ledger so a
//! conversation only ever sees its own accounts, categories and expenses.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Chat {0} already has a ledger")]
    LedgerExists(i64),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Chat / Ledger Operations ====================

    /// Ledger linked to a chat, if any
    pub fn ledger_for_chat(&self, chat_id: i64) -> DbResult<Option<LedgerHandle>> {
        let conn = self.lock();
        let ledger_id: Option<i64> = conn
            .query_row(
                "SELECT ledger_id FROM chats WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(ledger_id.map(|ledger_id| LedgerHandle {
            db: self.clone(),
            ledger_id,
        }))
    }

    /// Create a fresh ledger and link the chat to it
    pub fn create_ledger_for_chat(&self, chat_id: i64) -> DbResult<LedgerHandle> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT ledger_id FROM chats WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(DbError::LedgerExists(chat_id));
        }

        let now = Utc::now().to_rfc3339();
        tx.execute("INSERT INTO ledgers (created_at) VALUES (?1)", params![now])?;
        let ledger_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO chats (chat_id, ledger_id, linked_at) VALUES (?1, ?2, ?3)",
            params![chat_id, ledger_id, now],
        )?;
        tx.commit()?;

        tracing::info!(chat_id, ledger_id, "Created ledger");
        Ok(LedgerHandle {
            db: self.clone(),
            ledger_id,
        })
    }
}

/// Store access scoped to one ledger
#[derive(Clone)]
pub struct LedgerHandle {
    db: Database,
    ledger_id: i64,
}

impl std::fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandle")
            .field("ledger_id", &self.ledger_id)
            .finish_non_exhaustive()
    }
}

impl LedgerHandle {
    pub fn id(&self) -> i64 {
        self.ledger_id
    }

    // ==================== Accounts ====================

    pub fn accounts(&self) -> DbResult<Vec<Account>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare("SELECT id, icon, name FROM accounts WHERE ledger_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![self.ledger_id], |row| {
            Ok(Account {
                id: row.get(0)?,
                icon: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn add_account(&self, icon: &str, name: &str) -> DbResult<Account> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO accounts (ledger_id, icon, name) VALUES (?1, ?2, ?3)",
            params![self.ledger_id, icon, name],
        )?;
        Ok(Account {
            id: conn.last_insert_rowid(),
            icon: icon.to_string(),
            name: name.to_string(),
        })
    }

    // ==================== Categories ====================

    pub fn categories(&self) -> DbResult<Vec<Category>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare("SELECT id, icon, name FROM categories WHERE ledger_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![self.ledger_id], |row| {
            Ok(Category {
                id: row.get(0)?,
                icon: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn add_category(&self, icon: &str, name: &str) -> DbResult<Category> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO categories (ledger_id, icon, name) VALUES (?1, ?2, ?3)",
            params![self.ledger_id, icon, name],
        )?;
        Ok(Category {
            id: conn.last_insert_rowid(),
            icon: icon.to_string(),
            name: name.to_string(),
        })
    }

    // ==================== Expenses ====================

    pub fn add_expense(&self, expense: &NewExpense) -> DbResult<Expense> {
        let conn = self.db.lock();
        let date = expense.date.timestamp_millis();
        conn.execute(
            "INSERT INTO expenses (ledger_id, account_id, category_id, amount, date, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.ledger_id,
                expense.account_id,
                expense.category_id,
                expense.amount,
                date,
                expense.description
            ],
        )?;
        Ok(Expense {
            id: conn.last_insert_rowid(),
            account_id: expense.account_id,
            category_id: expense.category_id,
            amount: expense.amount,
            date,
            description: expense.description.clone(),
        })
    }

    /// Returns false when no such expense exists in this ledger
    pub fn remove_expense(&self, id: i64) -> DbResult<bool> {
        let conn = self.db.lock();
        let changed = conn.execute(
            "DELETE FROM expenses WHERE id = ?1 AND ledger_id = ?2",
            params![id, self.ledger_id],
        )?;
        Ok(changed > 0)
    }

    /// Returns false when no such expense exists in this ledger
    pub fn change_expense_date(&self, id: i64, date: DateTime<Utc>) -> DbResult<bool> {
        let conn = self.db.lock();
        let changed = conn.execute(
            "UPDATE expenses SET date = ?1 WHERE id = ?2 AND ledger_id = ?3",
            params![date.timestamp_millis(), id, self.ledger_id],
        )?;
        Ok(changed > 0)
    }

    /// Expenses dated in `[from, to]`, newest first
    pub fn expenses(
        &self,
        from: Option<DateTime<Utc>>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Expense>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, account_id, category_id, amount, date, description
             FROM expenses
             WHERE ledger_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date DESC, id DESC",
        )?;
        let from = from.map_or(i64::MIN, |d| d.timestamp_millis());
        let rows = stmt.query_map(
            params![self.ledger_id, from, to.timestamp_millis()],
            |row| {
                Ok(Expense {
                    id: row.get(0)?,
                    account_id: row.get(1)?,
                    category_id: row.get(2)?,
                    amount: row.get(3)?,
                    date: row.get(4)?,
                    description: row.get(5)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Total spent per category over `[from, to]`
    pub fn spent_by_category(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<HashMap<i64, f64>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT category_id, SUM(amount)
             FROM expenses
             WHERE ledger_id = ?1 AND date >= ?2 AND date <= ?3
             GROUP BY category_id",
        )?;
        let rows = stmt.query_map(
            params![self.ledger_id, from.timestamp_millis(), to.timestamp_millis()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    // ==================== Budgets ====================

    /// Set (or replace) the monthly budget of a category
    pub fn set_budget(&self, category_id: i64, value: f64) -> DbResult<Budget> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO budgets (ledger_id, category_id, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (ledger_id, category_id) DO UPDATE SET value = excluded.value",
            params![self.ledger_id, category_id, value],
        )?;
        let id = conn.query_row(
            "SELECT id FROM budgets WHERE ledger_id = ?1 AND category_id = ?2",
            params![self.ledger_id, category_id],
            |row| row.get(0),
        )?;
        Ok(Budget {
            id,
            category_id,
            value,
        })
    }

    pub fn budgets(&self) -> DbResult<Vec<Budget>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, category_id, value FROM budgets WHERE ledger_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![self.ledger_id], |row| {
            Ok(Budget {
                id: row.get(0)?,
                category_id: row.get(1)?,
                value: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn budget_for(&self, category_id: i64) -> DbResult<Option<Budget>> {
        Ok(self
            .budgets()?
            .into_iter()
            .find(|b| b.category_id == category_id))
    }
}
