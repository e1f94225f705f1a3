use crate::chart_of_accounts::{account_class, AccountClass, REVENUE};
use crate::error::Result;
use crate::schema::{DateRange, LedgerEntry};
use crate::store::InvoiceStore;
use crate::utils::round2;
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfitAndLoss {
    pub period: DateRange,
    pub total_revenue: f64,
    pub total_expenses: f64,
    pub net_profit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagExpenseReport {
    pub tag: String,
    pub period: DateRange,
    pub total_expenses: f64,
    pub transactions: Vec<LedgerEntry>,
}

/// Revenue and expense totals over a set of entries. Accounts outside both allow-lists are ignored.
pub fn summarize(range: DateRange, entries: &[LedgerEntry]) -> ProfitAndLoss {
    let mut revenue = 0.0;
    let mut expenses = 0.0;

    for e in entries {
        match account_class(&e.entry.gl_account) {
            Some(AccountClass::Revenue) => revenue += e.entry.amount,
            Some(AccountClass::Expense) => expenses += e.entry.amount,
            None => debug!(
                "GL account '{}' is outside the P&L allow-lists; ignored",
                e.entry.gl_account
            ),
        }
    }

    ProfitAndLoss {
        period: range,
        total_revenue: round2(revenue),
        total_expenses: round2(expenses),
        net_profit: round2(revenue - expenses),
    }
}

pub async fn profit_and_loss(store: &dyn InvoiceStore, range: DateRange) -> Result<ProfitAndLoss> {
    let entries = store.get_ledger_entries(range).await?;
    let pnl = summarize(range, &entries);
    info!(
        "P&L {} to {}: revenue {:.2}, expenses {:.2}, net {:.2}",
        range.start, range.end, pnl.total_revenue, pnl.total_expenses, pnl.net_profit
    );
    Ok(pnl)
}

/// Total spend of the entries carrying `tag`, revenue excluded.
pub async fn expenses_by_tag(
    store: &dyn InvoiceStore,
    tag: &str,
    range: DateRange,
) -> Result<TagExpenseReport> {
    let transactions = store.get_ledger_entries_by_tag(tag, range).await?;
    let total: f64 = transactions
        .iter()
        .filter(|e| e.entry.gl_account != REVENUE)
        .map(|e| e.entry.amount)
        .sum();

    Ok(TagExpenseReport {
        tag: tag.to_string(),
        period: range,
        total_expenses: round2(total),
        transactions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntryType, NewLedgerEntry};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn entry(gl_account: &str, amount: f64) -> LedgerEntry {
        LedgerEntry {
            id: "e".to_string(),
            posting_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            entry: NewLedgerEntry {
                invoice_id: "i".to_string(),
                transaction_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                vendor: "v".to_string(),
                description: "Invoice N/A".to_string(),
                amount,
                currency: "USD".to_string(),
                gl_account: gl_account.to_string(),
                entry_type: EntryType::Debit,
                payment_method: None,
                tags: BTreeSet::new(),
            },
        }
    }

    #[test]
    fn test_summarize_buckets_by_allow_list() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let pnl = summarize(
            range,
            &[
                entry("Sales", 1000.0),
                entry("Revenue", 250.5),
                entry("Rent", 400.0),
                entry("Uncategorized Expense", 0.26),
                entry("Travel", 9999.0),
            ],
        );
        assert_eq!(pnl.total_revenue, 1250.5);
        assert_eq!(pnl.total_expenses, 400.26);
        assert_eq!(pnl.net_profit, 850.24);
    }

    #[test]
    fn test_empty_period_is_zero() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let pnl = summarize(DateRange::new(day, day), &[]);
        assert_eq!(pnl.total_revenue, 0.0);
        assert_eq!(pnl.total_expenses, 0.0);
        assert_eq!(pnl.net_profit, 0.0);
    }
}
