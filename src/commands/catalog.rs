//! Accounts and categories: both are an icon plus a title

use crate::chain::{proceed, CommandRegistry, RegistryError, StepOutcome};
use crate::db::LedgerHandle;
use crate::report;

pub const ADD_ACCOUNT: &str = "/add_account";
pub const ADD_CATEGORY: &str = "/add_category";

const CANCELLED: &str = "Cancelled.";

#[derive(Debug, Default)]
struct NamedDraft {
    icon: String,
    title: String,
}

#[derive(Debug, Clone, Copy)]
enum Catalog {
    Accounts,
    Categories,
}

impl Catalog {
    fn noun(self) -> &'static str {
        match self {
            Self::Accounts => "account",
            Self::Categories => "category",
        }
    }

    fn add(self, ledger: &LedgerHandle, draft: &NamedDraft) -> crate::db::DbResult<()> {
        match self {
            Self::Accounts => ledger.add_account(&draft.icon, &draft.title).map(|_| ()),
            Self::Categories => ledger.add_category(&draft.icon, &draft.title).map(|_| ()),
        }
    }

    fn listing(self, ledger: &LedgerHandle) -> crate::db::DbResult<String> {
        Ok(match self {
            Self::Accounts => report::account_list(&ledger.accounts()?),
            Self::Categories => report::category_list(&ledger.categories()?),
        })
    }
}

pub fn register(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    register_add(registry, Catalog::Accounts, ADD_ACCOUNT, "Adds a new bank account")?;
    register_list(registry, Catalog::Accounts, "/get_accounts", "Lists the accounts")?;
    register_add(registry, Catalog::Categories, ADD_CATEGORY, "Adds a new expense category")?;
    register_list(
        registry,
        Catalog::Categories,
        "/get_categories",
        "Lists all the expense categories",
    )
}

fn register_add(
    registry: &mut CommandRegistry,
    catalog: Catalog,
    trigger: &str,
    description: &str,
) -> Result<(), RegistryError> {
    let noun = catalog.noun();
    registry
        .register::<NamedDraft>(trigger, description, false)
        .requires_ledger()
        .free_text(format!("Icon of the {noun}?"), |acc, icon| {
            acc.data.icon = icon;
            proceed()
        })
        .free_text(format!("Title of the {noun}?"), |acc, title| {
            acc.data.title = title;
            let preview = format!("{} {}", acc.data.icon, acc.data.title);
            acc.reply(preview);
            proceed()
        })
        .confirm("Are you sure?", move |acc, yes| {
            if !yes {
                acc.reply(CANCELLED);
                return Ok(StepOutcome::Abort);
            }
            catalog.add(acc.ledger()?, &acc.data)?;
            let added = format!("{} {} added.", acc.data.icon, acc.data.title);
            acc.reply(added);
            proceed()
        })
        .install()
}

fn register_list(
    registry: &mut CommandRegistry,
    catalog: Catalog,
    trigger: &str,
    description: &str,
) -> Result<(), RegistryError> {
    registry
        .register::<()>(trigger, description, false)
        .requires_ledger()
        .tap(move |acc| {
            let listing = catalog.listing(acc.ledger()?)?;
            acc.reply(listing);
            proceed()
        })
        .install()
}
