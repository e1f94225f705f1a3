use crate::chart_of_accounts::{account_class, AccountClass};
use crate::config::ForecastConfig;
use crate::error::{InvoiceError, Result};
use crate::ledger::UNKNOWN_VENDOR;
use crate::schema::{
    DateRange, ForecastEvent, ForecastEventType, InvoiceRecord, LedgerEntry, PaymentStatus,
};
use crate::store::InvoiceStore;
use crate::utils::days_between;
use chrono::{Days, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const UNKNOWN_CUSTOMER: &str = "Unknown Customer";

pub const FORECAST_CAVEAT: &str = "This forecast is an approximation based on recurring-expense \
patterns and invoice due dates. It is not a guaranteed cash position.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CashflowForecast {
    pub forecast_start_date: NaiveDate,
    pub forecast_end_date: NaiveDate,
    pub forecast_days: u32,
    pub projected_events: Vec<ForecastEvent>,
    pub notes: Vec<String>,
}

/// Projects near-term cash events from ledger history and open invoices.
///
/// Each of the three sources degrades on its own: a source that cannot be queried
/// contributes nothing and is named in the notes.
#[derive(Debug, Clone, Default)]
pub struct CashflowForecaster {
    config: ForecastConfig,
}

impl CashflowForecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Finds vendors whose last two expense entries look like a monthly bill and
    /// projects the next occurrence, keeping projections up to `window.end`.
    ///
    /// A projection that already lies before `window.start` is kept: the bill is due
    /// and has not been recorded yet.
    pub fn detect_recurring(&self, entries: &[LedgerEntry], window: DateRange) -> Vec<ForecastEvent> {
        let mut by_vendor: BTreeMap<&str, Vec<&LedgerEntry>> = BTreeMap::new();
        for e in entries {
            if account_class(&e.entry.gl_account) == Some(AccountClass::Revenue) {
                continue;
            }
            by_vendor.entry(e.entry.vendor.as_str()).or_default().push(e);
        }

        let mut events = Vec::new();
        for (vendor, mut history) in by_vendor {
            if history.len() < 2 {
                continue;
            }
            history.sort_by_key(|e| e.entry.transaction_date);

            let previous = &history[history.len() - 2].entry;
            let latest = &history[history.len() - 1].entry;

            let delta = days_between(previous.transaction_date, latest.transaction_date);
            let relative_diff = (latest.amount - previous.amount).abs()
                / previous.amount.max(latest.amount).max(1.0);

            if delta < self.config.recurrence_min_gap_days
                || delta > self.config.recurrence_max_gap_days
                || relative_diff >= self.config.recurrence_amount_tolerance
            {
                continue;
            }

            let Some(next) = latest
                .transaction_date
                .checked_add_days(Days::new(delta as u64))
            else {
                continue;
            };

            if next <= window.end {
                info!(
                    "Detected recurring expense for {}: every {} days, next {} on {}",
                    vendor, delta, latest.amount, next
                );
                events.push(ForecastEvent {
                    date: next,
                    vendor: vendor.to_string(),
                    amount: latest.amount,
                    event_type: ForecastEventType::RecurringExpense,
                    invoice_id: None,
                });
            }
        }
        events
    }

    pub fn project_payables(&self, invoices: &[InvoiceRecord]) -> Vec<ForecastEvent> {
        project_invoices(invoices, ForecastEventType::AccountsPayable, UNKNOWN_VENDOR)
    }

    pub fn project_receivables(&self, invoices: &[InvoiceRecord]) -> Vec<ForecastEvent> {
        project_invoices(invoices, ForecastEventType::AccountsReceivable, UNKNOWN_CUSTOMER)
    }

    /// Forecast for `days_ahead` days starting at `today`.
    pub async fn forecast_from(
        &self,
        store: &dyn InvoiceStore,
        today: NaiveDate,
        days_ahead: u32,
    ) -> Result<CashflowForecast> {
        if days_ahead < self.config.min_days_ahead || days_ahead > self.config.max_days_ahead {
            return Err(InvoiceError::InputError(format!(
                "daysAhead must be between {} and {}, got {}",
                self.config.min_days_ahead, self.config.max_days_ahead, days_ahead
            )));
        }

        let end = today
            .checked_add_days(Days::new(days_ahead.into()))
            .ok_or_else(|| InvoiceError::DateError(format!("{} + {} days", today, days_ahead)))?;
        let lookback_start = today
            .checked_sub_days(Days::new(self.config.lookback_days))
            .ok_or_else(|| {
                InvoiceError::DateError(format!("{} - {} days", today, self.config.lookback_days))
            })?;
        let window = DateRange::new(today, end);

        let mut notes = vec![FORECAST_CAVEAT.to_string()];

        // The three sources are independent; query them together.
        let (history, payable_invoices, receivable_invoices) = futures::join!(
            store.get_ledger_entries(DateRange::new(lookback_start, today)),
            store.get_invoices_due_between(window, PaymentStatus::Paid),
            store.get_invoices_by_status(PaymentStatus::Unpaid, window),
        );

        let recurring = match history {
            Ok(entries) => self.detect_recurring(&entries, window),
            Err(e) => {
                degrade("recurring expenses", e, &mut notes);
                Vec::new()
            }
        };

        let payables = match payable_invoices {
            Ok(invoices) => self.project_payables(&invoices),
            Err(e) => {
                degrade("accounts payable", e, &mut notes);
                Vec::new()
            }
        };

        let receivables = match receivable_invoices {
            Ok(invoices) => self.project_receivables(&invoices),
            Err(e) => {
                degrade("accounts receivable", e, &mut notes);
                Vec::new()
            }
        };

        let payable_ids: HashSet<&str> = payables
            .iter()
            .filter_map(|e| e.invoice_id.as_deref())
            .collect();
        if receivables
            .iter()
            .filter_map(|e| e.invoice_id.as_deref())
            .any(|id| payable_ids.contains(id))
        {
            notes.push(
                "Unpaid invoices are projected both as payables and as receivables.".to_string(),
            );
        }

        info!(
            "Cashflow forecast {} to {}: {} recurring, {} payable, {} receivable events",
            today,
            end,
            recurring.len(),
            payables.len(),
            receivables.len()
        );

        Ok(CashflowForecast {
            forecast_start_date: today,
            forecast_end_date: end,
            forecast_days: days_ahead,
            projected_events: merge_events(vec![recurring, payables, receivables]),
            notes,
        })
    }
}

/// Concatenates in source order and sorts by date. The sort is stable, so ties keep source order.
pub fn merge_events(sources: Vec<Vec<ForecastEvent>>) -> Vec<ForecastEvent> {
    let mut merged: Vec<ForecastEvent> = sources.into_iter().flatten().collect();
    merged.sort_by_key(|e| e.date);
    merged
}

fn project_invoices(
    invoices: &[InvoiceRecord],
    event_type: ForecastEventType,
    unknown_party: &str,
) -> Vec<ForecastEvent> {
    invoices
        .iter()
        .filter_map(|rec| {
            let fields = &rec.result.fields;
            match (fields.due_date, fields.total_amount) {
                (Some(date), Some(amount)) => Some(ForecastEvent {
                    date,
                    vendor: fields
                        .vendor
                        .clone()
                        .unwrap_or_else(|| unknown_party.to_string()),
                    amount,
                    event_type,
                    invoice_id: Some(rec.id.clone()),
                }),
                _ => {
                    warn!(
                        "Skipping invoice {} in {:?} projection: missing due date or total amount",
                        rec.id, event_type
                    );
                    None
                }
            }
        })
        .collect()
}

fn degrade(source: &str, err: InvoiceError, notes: &mut Vec<String>) {
    warn!("Forecast source '{}' unavailable: {}", source, err);
    notes.push(format!("{} could not be projected: {}", source, err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntryType, ExtractionResult, InvoiceFields, NewLedgerEntry};
    use std::collections::BTreeSet;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(n - 1))
            .unwrap()
    }

    fn spend(vendor: &str, on: NaiveDate, amount: f64, gl_account: &str) -> LedgerEntry {
        LedgerEntry {
            id: format!("{}-{}", vendor, on),
            posting_date: on,
            entry: NewLedgerEntry {
                invoice_id: format!("inv-{}-{}", vendor, on),
                transaction_date: on,
                vendor: vendor.to_string(),
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

    fn invoice(id: &str, vendor: Option<&str>, due: Option<NaiveDate>, total: Option<f64>) -> InvoiceRecord {
        InvoiceRecord {
            id: id.to_string(),
            result: ExtractionResult {
                fields: InvoiceFields {
                    vendor: vendor.map(str::to_string),
                    due_date: due,
                    total_amount: total,
                    ..Default::default()
                },
                ..Default::default()
            },
            payment_status: None,
        }
    }

    #[test]
    fn test_monthly_bill_is_projected() {
        let forecaster = CashflowForecaster::default();
        let entries = vec![
            spend("Staples", day(1), 100.0, "Office Supplies"),
            spend("Staples", day(31), 104.0, "Office Supplies"),
        ];
        let events = forecaster.detect_recurring(&entries, DateRange::new(day(31), day(91)));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, day(61));
        assert_eq!(events[0].amount, 104.0);
        assert_eq!(events[0].event_type, ForecastEventType::RecurringExpense);
    }

    #[test]
    fn test_projection_outside_window_is_dropped() {
        let forecaster = CashflowForecaster::default();
        let entries = vec![
            spend("Staples", day(1), 100.0, "Office Supplies"),
            spend("Staples", day(31), 104.0, "Office Supplies"),
        ];
        let events = forecaster.detect_recurring(&entries, DateRange::new(day(31), day(45)));
        assert!(events.is_empty());
    }

    #[test]
    fn test_overdue_projection_is_kept() {
        let forecaster = CashflowForecaster::default();
        let entries = vec![
            spend("Staples", day(1), 100.0, "Office Supplies"),
            spend("Staples", day(26), 100.0, "Office Supplies"),
        ];
        // Next occurrence is day 51 (2024-02-20), before today (2024-03-01).
        let events = forecaster.detect_recurring(&entries, DateRange::new(day(61), day(91)));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, day(51));
        assert_eq!(events[0].vendor, "Staples");
    }

    #[test]
    fn test_irregular_gap_or_amount_is_not_recurring() {
        let forecaster = CashflowForecaster::default();
        let window = DateRange::new(day(1), day(200));

        let too_close = vec![
            spend("A", day(1), 100.0, "Rent"),
            spend("A", day(20), 100.0, "Rent"),
        ];
        assert!(forecaster.detect_recurring(&too_close, window).is_empty());

        let amount_jump = vec![
            spend("B", day(1), 100.0, "Rent"),
            spend("B", day(31), 112.0, "Rent"),
        ];
        assert!(forecaster.detect_recurring(&amount_jump, window).is_empty());

        let revenue = vec![
            spend("C", day(1), 100.0, "Revenue"),
            spend("C", day(31), 100.0, "Revenue"),
        ];
        assert!(forecaster.detect_recurring(&revenue, window).is_empty());
    }

    #[test]
    fn test_only_last_two_entries_count() {
        let forecaster = CashflowForecaster::default();
        let entries = vec![
            spend("Cloud", day(40), 50.0, "Software & Subscriptions"),
            spend("Cloud", day(1), 10.0, "Software & Subscriptions"),
            spend("Cloud", day(12), 50.0, "Software & Subscriptions"),
        ];
        // Last two are day 12 and day 40: 28 days apart, same amount.
        let events = forecaster.detect_recurring(&entries, DateRange::new(day(40), day(100)));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, day(68));
    }

    #[test]
    fn test_invoices_missing_fields_are_skipped() {
        let forecaster = CashflowForecaster::default();
        let invoices = vec![
            invoice("a", Some("ACME"), Some(day(5)), Some(10.0)),
            invoice("b", None, Some(day(6)), Some(20.0)),
            invoice("c", Some("NoTotal"), Some(day(7)), None),
        ];

        let payables = forecaster.project_payables(&invoices);
        assert_eq!(payables.len(), 2);
        assert_eq!(payables[1].vendor, UNKNOWN_VENDOR);

        let receivables = forecaster.project_receivables(&invoices);
        assert_eq!(receivables[1].vendor, UNKNOWN_CUSTOMER);
        assert_eq!(receivables[0].invoice_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_merge_is_stable_by_date() {
        let event = |d: NaiveDate, vendor: &str, event_type| ForecastEvent {
            date: d,
            vendor: vendor.to_string(),
            amount: 1.0,
            event_type,
            invoice_id: None,
        };
        let merged = merge_events(vec![
            vec![event(day(10), "recurring", ForecastEventType::RecurringExpense)],
            vec![
                event(day(10), "payable", ForecastEventType::AccountsPayable),
                event(day(3), "early", ForecastEventType::AccountsPayable),
            ],
        ]);
        let vendors: Vec<&str> = merged.iter().map(|e| e.vendor.as_str()).collect();
        assert_eq!(vendors, vec!["early", "recurring", "payable"]);
    }
}
