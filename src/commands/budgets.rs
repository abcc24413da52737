//! Monthly budgets per category

use super::{category_choices, parse_id, require_categories};
use crate::chain::{proceed, CommandRegistry, RegistryError};
use crate::report::{self, parse_amount};
use chrono::Utc;

#[derive(Debug, Default)]
struct BudgetDraft {
    category_id: i64,
}

pub fn register(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    registry
        .register::<BudgetDraft>("/set_budget", "Set a monthly budget on a category", false)
        .requires_ledger()
        .guard(require_categories)
        .choice_in_columns("Which category?", 2, category_choices, |acc, payload| {
            acc.data.category_id = parse_id(&payload)?;
            proceed()
        })
        .free_text_parsed(
            "How much can you spend per month?",
            parse_amount,
            |acc, amount| {
                acc.ledger()?.set_budget(acc.data.category_id, amount)?;
                acc.reply("Budget set.");
                proceed()
            },
        )
        .install()?;

    registry
        .register::<()>("/get_budgets", "Lists the budgets for each category", true)
        .requires_ledger()
        .tap(|acc| {
            let ledger = acc.ledger()?;
            let now = Utc::now();
            let overview = report::budget_overview(
                &ledger.budgets()?,
                &ledger.categories()?,
                &ledger.spent_by_category(report::start_of_month(now), now)?,
            );
            acc.reply(overview);
            proceed()
        })
        .install()
}

#[cfg(test)]
mod tests {
    use crate::commands::tests::{bot, bot_with_basics};
    use crate::chain::INVALID_ANSWER;
    use crate::report::{NO_BUDGETS, NO_CATEGORIES};
    use crate::runtime::ALL_DONE;

    #[tokio::test]
    async fn test_set_budget_needs_categories() {
        let mut bot = bot().with_ledger();
        assert_eq!(bot.texts("/set_budget").await, vec![NO_CATEGORIES, ALL_DONE]);
    }

    #[tokio::test]
    async fn test_set_and_replace_budget() {
        let mut bot = bot_with_basics();
        assert_eq!(bot.texts("/get_budgets").await, vec![NO_BUDGETS, ALL_DONE]);

        assert_eq!(
            bot.texts("/set_budget").await,
            vec!["Which category?", "🍔 Food selected.", "How much can you spend per month?"]
        );
        assert_eq!(bot.texts("lots").await, vec![INVALID_ANSWER]);
        assert_eq!(bot.texts("100").await, vec!["Budget set.", ALL_DONE]);

        bot.send("25 pizza").await;
        bot.send("/set_budget").await;
        bot.send("50").await;

        assert_eq!(
            bot.texts("/get_budgets").await,
            vec!["50€ - 🍔 Food\n    50.00% used for this month", ALL_DONE]
        );
    }
}
