//! `/start`: link the chat to a fresh ledger

use crate::chain::{proceed, CommandRegistry, RegistryError};
use crate::db::{Database, DbError};

pub const START: &str = "/start";

const ALREADY_SET_UP: &str = "This chat already has a ledger.";
const CREATED: &str =
    "Ledger created. Add an account with /add_account and a category with /add_category to get started.";

pub fn register(registry: &mut CommandRegistry, db: &Database) -> Result<(), RegistryError> {
    let db = db.clone();
    registry
        .register::<()>(START, "Creates the expense ledger of this chat", false)
        .tap(move |acc| {
            if acc.has_ledger() {
                acc.reply(ALREADY_SET_UP);
                return proceed();
            }
            match db.create_ledger_for_chat(acc.conversation.0) {
                Ok(ledger) => {
                    acc.set_ledger(ledger);
                    acc.reply(CREATED);
                }
                // Another chain got there first
                Err(DbError::LedgerExists(_)) => acc.reply(ALREADY_SET_UP),
                Err(e) => return Err(e.into()),
            }
            proceed()
        })
        .install()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::bot;
    use crate::runtime::testing::TEST_CHAT;
    use crate::runtime::ALL_DONE;

    #[tokio::test]
    async fn test_start_creates_ledger_once() {
        let mut bot = bot();

        assert_eq!(bot.texts("/start").await, vec![CREATED, ALL_DONE]);
        let first = bot.db.ledger_for_chat(TEST_CHAT.0).unwrap().unwrap();

        assert_eq!(bot.texts("/start").await, vec![ALREADY_SET_UP, ALL_DONE]);
        let second = bot.db.ledger_for_chat(TEST_CHAT.0).unwrap().unwrap();
        assert_eq!(first.id(), second.id());
    }
}
