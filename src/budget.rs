use crate::error::Result;
use crate::schema::{Budget, LedgerEntry};
use crate::store::InvoiceStore;
use crate::utils::{parse_period_string, round2};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NO_BUDGETS_MESSAGE: &str = "No budgets found for this period.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetLine {
    /// `None` when spending occurred in a category with no budget.
    pub budget: Option<f64>,
    pub actual: f64,
    pub variance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetReport {
    pub period: String,
    pub report: BTreeMap<String, BudgetLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Budget vs. actual per category.
///
/// Several budgets for the same category are added together. Categories that only
/// appear on the spending side get `variance = -actual`.
pub fn compute_variance(budgets: &[Budget], entries: &[LedgerEntry]) -> BTreeMap<String, BudgetLine> {
    let mut planned: BTreeMap<&str, f64> = BTreeMap::new();
    for b in budgets {
        *planned.entry(b.budget.category.as_str()).or_insert(0.0) += b.budget.amount;
    }

    let mut actual: BTreeMap<&str, f64> = BTreeMap::new();
    for e in entries {
        *actual.entry(e.entry.gl_account.as_str()).or_insert(0.0) += e.entry.amount;
    }

    let categories: std::collections::BTreeSet<&str> =
        planned.keys().chain(actual.keys()).copied().collect();

    categories
        .into_iter()
        .map(|category| {
            let spent = actual.get(category).copied().unwrap_or(0.0);
            let budget = planned.get(category).copied();
            let variance = match budget {
                Some(amount) => amount - spent,
                None => -spent,
            };
            (
                category.to_string(),
                BudgetLine {
                    budget,
                    actual: round2(spent),
                    variance: round2(variance),
                },
            )
        })
        .collect()
}

/// Builds the report for a `YYYY-MM`, `YYYY-Qn` or `YYYY` period.
pub async fn budget_report(store: &dyn InvoiceStore, period: &str) -> Result<BudgetReport> {
    let period = period.trim();
    let (_, range) = parse_period_string(period)?;

    let budgets = store.get_budgets(period).await?;
    if budgets.is_empty() {
        info!("No budgets defined for period {}", period);
        return Ok(BudgetReport {
            period: period.to_string(),
            report: BTreeMap::new(),
            message: Some(NO_BUDGETS_MESSAGE.to_string()),
        });
    }

    let entries = store.get_ledger_entries(range).await?;
    let report = compute_variance(&budgets, &entries);
    info!(
        "Budget report for {}: {} categories from {} budgets and {} ledger entries",
        period,
        report.len(),
        budgets.len(),
        entries.len()
    );

    Ok(BudgetReport {
        period: period.to_string(),
        report,
        message: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntryType, NewBudget, NewLedgerEntry, PeriodType};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn budget(category: &str, amount: f64) -> Budget {
        Budget {
            id: format!("b-{}", category),
            budget: NewBudget {
                category: category.to_string(),
                period_type: PeriodType::Monthly,
                period_value: "2024-01".to_string(),
                amount,
            },
        }
    }

    fn spent(gl_account: &str, amount: f64) -> LedgerEntry {
        LedgerEntry {
            id: "e".to_string(),
            posting_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            entry: NewLedgerEntry {
                invoice_id: "i".to_string(),
                transaction_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
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
    fn test_variance_with_and_without_budget() {
        let report = compute_variance(
            &[budget("Office Supplies", 500.0), budget("Rent", 1000.0)],
            &[
                spent("Office Supplies", 120.25),
                spent("Office Supplies", 30.0),
                spent("Software & Subscriptions", 99.999),
            ],
        );

        let office = &report["Office Supplies"];
        assert_eq!(office.budget, Some(500.0));
        assert_eq!(office.actual, 150.25);
        assert_eq!(office.variance, 349.75);

        let rent = &report["Rent"];
        assert_eq!(rent.actual, 0.0);
        assert_eq!(rent.variance, 1000.0);

        let software = &report["Software & Subscriptions"];
        assert_eq!(software.budget, None);
        assert_eq!(software.actual, 100.0);
        assert_eq!(software.variance, -100.0);
    }

    #[test]
    fn test_duplicate_budgets_are_summed() {
        let report = compute_variance(
            &[budget("Rent", 600.0), budget("Rent", 400.0)],
            &[spent("Rent", 1000.0)],
        );
        assert_eq!(report["Rent"].budget, Some(1000.0));
        assert_eq!(report["Rent"].variance, 0.0);
    }
}
