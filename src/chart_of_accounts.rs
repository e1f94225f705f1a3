use crate::schema::UNCATEGORIZED_EXPENSE;
use serde::{Deserialize, Serialize};

pub const SOFTWARE_AND_SUBSCRIPTIONS: &str = "Software & Subscriptions";
pub const MARKETING_AND_ADVERTISING: &str = "Marketing & Advertising";
pub const OFFICE_SUPPLIES: &str = "Office Supplies";
pub const REVENUE: &str = "Revenue";

/// One row of the vendor categorization table.
#[derive(Debug, Clone, Copy)]
pub struct GlAccountRule {
    pub keywords: &'static [&'static str],
    pub account: &'static str,
}

/// Evaluated top to bottom; the first rule with a keyword in the vendor name wins.
pub const GL_ACCOUNT_RULES: &[GlAccountRule] = &[
    GlAccountRule {
        keywords: &["software", "saas", "aws", "google cloud"],
        account: SOFTWARE_AND_SUBSCRIPTIONS,
    },
    GlAccountRule {
        keywords: &["marketing", "advertising"],
        account: MARKETING_AND_ADVERTISING,
    },
    GlAccountRule {
        keywords: &["office supplies", "staples"],
        account: OFFICE_SUPPLIES,
    },
];

pub const REVENUE_ACCOUNTS: &[&str] = &[REVENUE, "Sales"];

pub const EXPENSE_ACCOUNTS: &[&str] = &[
    SOFTWARE_AND_SUBSCRIPTIONS,
    MARKETING_AND_ADVERTISING,
    OFFICE_SUPPLIES,
    "Rent",
    "Utilities",
    "Salaries",
    UNCATEGORIZED_EXPENSE,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountClass {
    Revenue,
    Expense,
}

/// Assigns a GL account from the vendor name, case-insensitively.
pub fn categorize_vendor(vendor: Option<&str>) -> &'static str {
    let Some(vendor) = vendor else {
        return UNCATEGORIZED_EXPENSE;
    };
    let vendor = vendor.to_lowercase();

    GL_ACCOUNT_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| vendor.contains(kw)))
        .map(|rule| rule.account)
        .unwrap_or(UNCATEGORIZED_EXPENSE)
}

/// Profit-and-loss bucket for a GL account; `None` for accounts outside both allow-lists.
pub fn account_class(gl_account: &str) -> Option<AccountClass> {
    if REVENUE_ACCOUNTS.contains(&gl_account) {
        Some(AccountClass::Revenue)
    } else if EXPENSE_ACCOUNTS.contains(&gl_account) {
        Some(AccountClass::Expense)
    } else {
        None
    }
}
