use crate::error::{InvoiceError, Result};
use crate::schema::{
    Budget, DateRange, ExtractionResult, InvoiceRecord, LedgerEntry, NewBudget, NewLedgerEntry,
    PaymentStatus, ProcessingStatus,
};
use async_trait::async_trait;
use chrono::Local;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Persistence for invoices, ledger entries and budgets.
///
/// The two accounts-payable/receivable queries are optional capabilities: a store
/// that cannot answer them keeps the default implementations, which report
/// `ForecastSourceUnavailable` so the forecaster can skip that source.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn create_extraction_result(&self, result: ExtractionResult) -> Result<InvoiceRecord>;

    async fn get_extraction_result(&self, id: &str) -> Result<Option<InvoiceRecord>>;

    /// Rewrites status and error message. A record already in `Error` is refused,
    /// so the first failure message stands.
    async fn update_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        message: Option<String>,
    ) -> Result<InvoiceRecord>;

    async fn set_payment_status(&self, id: &str, status: PaymentStatus) -> Result<InvoiceRecord>;

    /// Fails with `PersistenceError` when the invoice already has a ledger entry.
    async fn create_ledger_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry>;

    async fn get_ledger_entry_for_invoice(&self, invoice_id: &str) -> Result<Option<LedgerEntry>>;

    /// Appends a tag unless the entry already carries it.
    async fn add_tag(&self, entry_id: &str, tag: &str) -> Result<LedgerEntry>;

    /// Stores a new invoice together with the ledger entry `entry_for` derives from it.
    ///
    /// Either the record is stored with its entry, or it is stored as `Error` with no entry.
    /// This default issues the two writes separately and demotes the record when the ledger
    /// write fails; stores with transactions should override it.
    async fn create_invoice_with_entry(
        &self,
        result: ExtractionResult,
        entry_for: &(dyn for<'r> Fn(&'r InvoiceRecord) -> Option<NewLedgerEntry> + Send + Sync),
    ) -> Result<(InvoiceRecord, Option<LedgerEntry>)> {
        let record = self.create_extraction_result(result).await?;
        let Some(entry) = entry_for(&record) else {
            return Ok((record, None));
        };

        match self.create_ledger_entry(entry).await {
            Ok(stored) => Ok((record, Some(stored))),
            Err(e) => {
                error!("Ledger entry for invoice {} failed: {}", record.id, e);
                let message = e.record_message();
                let record = match self
                    .update_status(&record.id, ProcessingStatus::Error, Some(message.clone()))
                    .await
                {
                    Ok(updated) => updated,
                    Err(update_err) => {
                        error!(
                            "Could not mark invoice {} as Error: {}",
                            record.id, update_err
                        );
                        let mut demoted = record;
                        demoted.result.processing_status = ProcessingStatus::Error;
                        demoted.result.error_message = Some(message);
                        demoted
                    }
                };
                Ok((record, None))
            }
        }
    }

    async fn create_budget(&self, budget: NewBudget) -> Result<Budget>;

    async fn get_budgets(&self, period_value: &str) -> Result<Vec<Budget>>;

    /// Entries whose transaction date falls in the range, ordered by transaction date.
    async fn get_ledger_entries(&self, range: DateRange) -> Result<Vec<LedgerEntry>>;

    async fn get_ledger_entries_by_tag(
        &self,
        tag: &str,
        range: DateRange,
    ) -> Result<Vec<LedgerEntry>>;

    /// Invoices due within the range whose payment status is not `exclude`.
    async fn get_invoices_due_between(
        &self,
        _range: DateRange,
        _exclude: PaymentStatus,
    ) -> Result<Vec<InvoiceRecord>> {
        Err(InvoiceError::unavailable("accounts payable"))
    }

    /// Invoices with exactly this payment status, due within the range.
    async fn get_invoices_by_status(
        &self,
        _status: PaymentStatus,
        _range: DateRange,
    ) -> Result<Vec<InvoiceRecord>> {
        Err(InvoiceError::unavailable("accounts receivable"))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Tables {
    invoices: HashMap<String, InvoiceRecord>,
    ledger: Vec<LedgerEntry>,
    budgets: Vec<Budget>,
}

impl Tables {
    fn insert_ledger_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        match self.invoices.get(&entry.invoice_id) {
            None => {
                return Err(InvoiceError::PersistenceError(format!(
                    "invoice {} not found",
                    entry.invoice_id
                )))
            }
            Some(rec) if rec.status() != ProcessingStatus::Processed => {
                return Err(InvoiceError::PersistenceError(format!(
                    "invoice {} is {}, only Processed invoices can be posted",
                    entry.invoice_id,
                    rec.status()
                )))
            }
            Some(_) => {}
        }

        if self
            .ledger
            .iter()
            .any(|existing| existing.entry.invoice_id == entry.invoice_id)
        {
            warn!(
                "Rejected duplicate ledger entry for invoice {}",
                entry.invoice_id
            );
            return Err(InvoiceError::PersistenceError(format!(
                "a ledger entry already exists for invoice {}",
                entry.invoice_id
            )));
        }

        let stored = LedgerEntry {
            id: new_id(),
            posting_date: Local::now().date_naive(),
            entry,
        };
        self.ledger.push(stored.clone());
        info!(
            "Ledger entry {} created for invoice {}",
            stored.id, stored.entry.invoice_id
        );
        Ok(stored)
    }
}

/// Thread-safe in-memory store. Every write happens under a single lock, so the
/// per-invoice ledger uniqueness check, the insert and the invoice status they
/// depend on change together.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    payables: bool,
    receivables: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            payables: true,
            receivables: true,
        }
    }

    /// Turns the accounts-payable or accounts-receivable queries off.
    pub fn with_capabilities(mut self, payables: bool, receivables: bool) -> Self {
        self.payables = payables;
        self.receivables = receivables;
        self
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| InvoiceError::PersistenceError("store lock poisoned".to_string()))
    }

    fn invoices_matching(
        &self,
        range: DateRange,
        keep: impl Fn(Option<PaymentStatus>) -> bool,
    ) -> Result<Vec<InvoiceRecord>> {
        let tables = self.tables()?;
        let mut found: Vec<InvoiceRecord> = tables
            .invoices
            .values()
            .filter(|rec| {
                rec.result
                    .fields
                    .due_date
                    .map(|due| range.contains(due))
                    .unwrap_or(false)
                    && keep(rec.payment_status)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.result
                .fields
                .due_date
                .cmp(&b.result.fields.due_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(found)
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn create_extraction_result(&self, result: ExtractionResult) -> Result<InvoiceRecord> {
        let record = InvoiceRecord {
            id: new_id(),
            result,
            payment_status: None,
        };
        self.tables()?
            .invoices
            .insert(record.id.clone(), record.clone());
        debug!(
            "Stored extraction result {} with status {}",
            record.id,
            record.status()
        );
        Ok(record)
    }

    async fn get_extraction_result(&self, id: &str) -> Result<Option<InvoiceRecord>> {
        Ok(self.tables()?.invoices.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        message: Option<String>,
    ) -> Result<InvoiceRecord> {
        let mut tables = self.tables()?;
        let record = tables.invoices.get_mut(id).ok_or_else(|| {
            InvoiceError::PersistenceError(format!("invoice {} not found", id))
        })?;
        if record.status() == ProcessingStatus::Error {
            warn!("Invoice {} is already in Error; status left unchanged", id);
            return Err(InvoiceError::PersistenceError(format!(
                "invoice {} is already in Error",
                id
            )));
        }
        record.result.processing_status = status;
        record.result.error_message = message;
        info!("Invoice {} status updated to {}", id, status);
        Ok(record.clone())
    }

    async fn set_payment_status(&self, id: &str, status: PaymentStatus) -> Result<InvoiceRecord> {
        let mut tables = self.tables()?;
        let record = tables.invoices.get_mut(id).ok_or_else(|| {
            InvoiceError::PersistenceError(format!("invoice {} not found", id))
        })?;
        record.payment_status = Some(status);
        Ok(record.clone())
    }

    async fn create_ledger_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        self.tables()?.insert_ledger_entry(entry)
    }

    async fn create_invoice_with_entry(
        &self,
        result: ExtractionResult,
        entry_for: &(dyn for<'r> Fn(&'r InvoiceRecord) -> Option<NewLedgerEntry> + Send + Sync),
    ) -> Result<(InvoiceRecord, Option<LedgerEntry>)> {
        let mut record = InvoiceRecord {
            id: new_id(),
            result,
            payment_status: None,
        };
        let mut tables = self.tables()?;
        tables.invoices.insert(record.id.clone(), record.clone());

        let Some(entry) = entry_for(&record) else {
            return Ok((record, None));
        };
        match tables.insert_ledger_entry(entry) {
            Ok(stored) => Ok((record, Some(stored))),
            Err(e) => {
                error!("Ledger entry for invoice {} failed: {}", record.id, e);
                record.result.processing_status = ProcessingStatus::Error;
                record.result.error_message = Some(e.record_message());
                tables.invoices.insert(record.id.clone(), record.clone());
                Ok((record, None))
            }
        }
    }

    async fn get_ledger_entry_for_invoice(&self, invoice_id: &str) -> Result<Option<LedgerEntry>> {
        Ok(self
            .tables()?
            .ledger
            .iter()
            .find(|e| e.entry.invoice_id == invoice_id)
            .cloned())
    }

    async fn add_tag(&self, entry_id: &str, tag: &str) -> Result<LedgerEntry> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(InvoiceError::InputError("tag must not be empty".to_string()));
        }

        let mut tables = self.tables()?;
        let entry = tables
            .ledger
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| {
                InvoiceError::PersistenceError(format!("ledger entry {} not found", entry_id))
            })?;
        if entry.entry.tags.insert(tag.to_string()) {
            debug!("Tag '{}' added to ledger entry {}", tag, entry_id);
        }
        Ok(entry.clone())
    }

    async fn create_budget(&self, budget: NewBudget) -> Result<Budget> {
        if !budget.amount.is_finite() || budget.amount < 0.0 {
            return Err(InvoiceError::InputError(format!(
                "budget amount for '{}' must be a non-negative number",
                budget.category
            )));
        }
        let stored = Budget {
            id: new_id(),
            budget,
        };
        self.tables()?.budgets.push(stored.clone());
        Ok(stored)
    }

    async fn get_budgets(&self, period_value: &str) -> Result<Vec<Budget>> {
        Ok(self
            .tables()?
            .budgets
            .iter()
            .filter(|b| b.budget.period_value == period_value)
            .cloned()
            .collect())
    }

    async fn get_ledger_entries(&self, range: DateRange) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .tables()?
            .ledger
            .iter()
            .filter(|e| range.contains(e.entry.transaction_date))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.entry.transaction_date);
        Ok(entries)
    }

    async fn get_ledger_entries_by_tag(
        &self,
        tag: &str,
        range: DateRange,
    ) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.get_ledger_entries(range).await?;
        entries.retain(|e| e.entry.tags.contains(tag));
        Ok(entries)
    }

    async fn get_invoices_due_between(
        &self,
        range: DateRange,
        exclude: PaymentStatus,
    ) -> Result<Vec<InvoiceRecord>> {
        if !self.payables {
            return Err(InvoiceError::unavailable("accounts payable"));
        }
        self.invoices_matching(range, |status| status != Some(exclude))
    }

    async fn get_invoices_by_status(
        &self,
        status: PaymentStatus,
        range: DateRange,
    ) -> Result<Vec<InvoiceRecord>> {
        if !self.receivables {
            return Err(InvoiceError::unavailable("accounts receivable"));
        }
        self.invoices_matching(range, |s| s == Some(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntryType, InvoiceFields, PeriodType};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn processed(total: f64, due: Option<NaiveDate>) -> ExtractionResult {
        ExtractionResult {
            fields: InvoiceFields {
                total_amount: Some(total),
                due_date: due,
                ..Default::default()
            },
            processing_status: ProcessingStatus::Processed,
            ..Default::default()
        }
    }

    fn entry(invoice_id: &str, on: NaiveDate, amount: f64) -> NewLedgerEntry {
        NewLedgerEntry {
            invoice_id: invoice_id.to_string(),
            transaction_date: on,
            vendor: "Staples".to_string(),
            description: "Invoice N/A".to_string(),
            amount,
            currency: "USD".to_string(),
            gl_account: "Office Supplies".to_string(),
            entry_type: EntryType::Debit,
            payment_method: None,
            tags: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn test_ledger_entry_is_unique_per_invoice() {
        let store = MemoryStore::new();
        let rec = store
            .create_extraction_result(processed(10.0, None))
            .await
            .unwrap();

        store
            .create_ledger_entry(entry(&rec.id, date(2024, 1, 1), 10.0))
            .await
            .unwrap();
        let second = store
            .create_ledger_entry(entry(&rec.id, date(2024, 1, 1), 10.0))
            .await;
        assert!(matches!(second, Err(InvoiceError::PersistenceError(_))));
    }

    #[tokio::test]
    async fn test_ledger_requires_processed_invoice() {
        let store = MemoryStore::new();
        let rec = store
            .create_extraction_result(ExtractionResult::failed("", "OCR Error: boom"))
            .await
            .unwrap();
        let result = store
            .create_ledger_entry(entry(&rec.id, date(2024, 1, 1), 10.0))
            .await;
        assert!(matches!(result, Err(InvoiceError::PersistenceError(_))));

        let result = store
            .create_ledger_entry(entry("missing", date(2024, 1, 1), 10.0))
            .await;
        assert!(matches!(result, Err(InvoiceError::PersistenceError(_))));
    }

    #[tokio::test]
    async fn test_error_status_is_written_once() {
        let store = MemoryStore::new();
        let rec = store
            .create_extraction_result(processed(10.0, None))
            .await
            .unwrap();

        store
            .update_status(&rec.id, ProcessingStatus::Error, Some("first".to_string()))
            .await
            .unwrap();
        let second = store
            .update_status(&rec.id, ProcessingStatus::Error, Some("second".to_string()))
            .await;
        assert!(matches!(second, Err(InvoiceError::PersistenceError(_))));

        let stored = store.get_extraction_result(&rec.id).await.unwrap().unwrap();
        assert_eq!(stored.result.error_message.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_invoice_and_entry_are_written_together() {
        let store = MemoryStore::new();
        let on = date(2024, 1, 15);
        let (rec, posted) = store
            .create_invoice_with_entry(processed(25.0, None), &|rec: &InvoiceRecord| {
                Some(entry(&rec.id, on, 25.0))
            })
            .await
            .unwrap();

        assert_eq!(rec.status(), ProcessingStatus::Processed);
        let posted = posted.unwrap();
        assert_eq!(posted.entry.invoice_id, rec.id);
        assert_eq!(
            store.get_ledger_entry_for_invoice(&rec.id).await.unwrap(),
            Some(posted)
        );
    }

    #[tokio::test]
    async fn test_rejected_entry_leaves_error_record_only() {
        let store = MemoryStore::new();
        let on = date(2024, 1, 15);
        let needs_review = ExtractionResult {
            processing_status: ProcessingStatus::NeedsReview,
            ..processed(25.0, None)
        };
        let (rec, posted) = store
            .create_invoice_with_entry(needs_review, &|rec: &InvoiceRecord| {
                Some(entry(&rec.id, on, 25.0))
            })
            .await
            .unwrap();

        assert!(posted.is_none());
        assert_eq!(rec.status(), ProcessingStatus::Error);
        let stored = store.get_extraction_result(&rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), ProcessingStatus::Error);
        assert!(stored
            .result
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Transaction Creation Error"));
        assert!(store
            .get_ledger_entry_for_invoice(&rec.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_no_entry_stores_record_as_is() {
        let store = MemoryStore::new();
        let (rec, posted) = store
            .create_invoice_with_entry(processed(25.0, None), &|_: &InvoiceRecord| None)
            .await
            .unwrap();
        assert!(posted.is_none());
        assert_eq!(rec.status(), ProcessingStatus::Processed);
    }

    #[tokio::test]
    async fn test_entries_filtered_and_ordered_by_date() {
        let store = MemoryStore::new();
        for (day, amount) in [(20, 3.0), (5, 1.0), (31, 9.0)] {
            let rec = store
                .create_extraction_result(processed(amount, None))
                .await
                .unwrap();
            store
                .create_ledger_entry(entry(&rec.id, date(2024, 1, day), amount))
                .await
                .unwrap();
        }

        let entries = store
            .get_ledger_entries(DateRange::new(date(2024, 1, 1), date(2024, 1, 20)))
            .await
            .unwrap();
        let amounts: Vec<f64> = entries.iter().map(|e| e.entry.amount).collect();
        assert_eq!(amounts, vec![1.0, 3.0]);
    }

    #[tokio::test]
    async fn test_add_tag_is_idempotent() {
        let store = MemoryStore::new();
        let rec = store
            .create_extraction_result(processed(10.0, None))
            .await
            .unwrap();
        let stored = store
            .create_ledger_entry(entry(&rec.id, date(2024, 2, 1), 10.0))
            .await
            .unwrap();

        store.add_tag(&stored.id, "travel").await.unwrap();
        let tagged = store.add_tag(&stored.id, "travel").await.unwrap();
        assert_eq!(tagged.entry.tags.len(), 1);

        let range = DateRange::new(date(2024, 2, 1), date(2024, 2, 29));
        let by_tag = store.get_ledger_entries_by_tag("travel", range).await.unwrap();
        assert_eq!(by_tag.len(), 1);
        assert!(store
            .get_ledger_entries_by_tag("other", range)
            .await
            .unwrap()
            .is_empty());

        assert!(matches!(
            store.add_tag("nope", "travel").await,
            Err(InvoiceError::PersistenceError(_))
        ));
    }

    #[tokio::test]
    async fn test_budgets_by_period() {
        let store = MemoryStore::new();
        store
            .create_budget(NewBudget {
                category: "Office Supplies".to_string(),
                period_type: PeriodType::Monthly,
                period_value: "2024-01".to_string(),
                amount: 500.0,
            })
            .await
            .unwrap();

        assert_eq!(store.get_budgets("2024-01").await.unwrap().len(), 1);
        assert!(store.get_budgets("2024-02").await.unwrap().is_empty());

        let negative = store
            .create_budget(NewBudget {
                category: "Rent".to_string(),
                period_type: PeriodType::Monthly,
                period_value: "2024-01".to_string(),
                amount: -1.0,
            })
            .await;
        assert!(matches!(negative, Err(InvoiceError::InputError(_))));
    }

    #[tokio::test]
    async fn test_payment_status_queries() {
        let store = MemoryStore::new();
        let window = DateRange::new(date(2024, 3, 1), date(2024, 3, 31));

        let unpaid = store
            .create_extraction_result(processed(100.0, Some(date(2024, 3, 10))))
            .await
            .unwrap();
        store
            .set_payment_status(&unpaid.id, PaymentStatus::Unpaid)
            .await
            .unwrap();

        let paid = store
            .create_extraction_result(processed(50.0, Some(date(2024, 3, 5))))
            .await
            .unwrap();
        store
            .set_payment_status(&paid.id, PaymentStatus::Paid)
            .await
            .unwrap();

        store
            .create_extraction_result(processed(70.0, Some(date(2024, 3, 2))))
            .await
            .unwrap();
        store
            .create_extraction_result(processed(70.0, Some(date(2024, 5, 2))))
            .await
            .unwrap();

        let payables = store
            .get_invoices_due_between(window, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(payables.len(), 2);
        assert_eq!(payables[0].result.fields.due_date, Some(date(2024, 3, 2)));

        let receivables = store
            .get_invoices_by_status(PaymentStatus::Unpaid, window)
            .await
            .unwrap();
        assert_eq!(receivables.len(), 1);
        assert_eq!(receivables[0].id, unpaid.id);
    }

    #[tokio::test]
    async fn test_disabled_capabilities_report_unavailable() {
        let store = MemoryStore::new().with_capabilities(false, false);
        let window = DateRange::new(date(2024, 3, 1), date(2024, 3, 31));
        assert!(matches!(
            store.get_invoices_due_between(window, PaymentStatus::Paid).await,
            Err(InvoiceError::ForecastSourceUnavailable { .. })
        ));
        assert!(matches!(
            store.get_invoices_by_status(PaymentStatus::Unpaid, window).await,
            Err(InvoiceError::ForecastSourceUnavailable { .. })
        ));
    }
}
