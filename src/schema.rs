use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_CURRENCY: &str = "USD";
pub const UNCATEGORIZED_EXPENSE: &str = "Uncategorized Expense";

/// Where a document stands after the pipeline has looked at it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processed,
    #[serde(rename = "Needs Review")]
    NeedsReview,
    Error,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Processed => "Processed",
            Self::NeedsReview => "Needs Review",
            Self::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Settlement state of an invoice, tracked separately from processing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub price: f64,
    pub line_total: f64,
}

impl Default for LineItem {
    fn default() -> Self {
        Self {
            description: "N/A".to_string(),
            quantity: 1.0,
            price: 0.0,
            line_total: 0.0,
        }
    }
}

/// Structured fields pulled out of an invoice, before any status decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFields {
    pub vendor: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub total_amount: Option<f64>,
    pub currency: String,
}

impl Default for InvoiceFields {
    fn default() -> Self {
        Self {
            vendor: None,
            invoice_date: None,
            due_date: None,
            invoice_number: None,
            line_items: Vec::new(),
            subtotal: None,
            tax: None,
            total_amount: None,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// One ingested document's extraction outcome, ready to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    #[serde(flatten)]
    pub fields: InvoiceFields,
    pub extracted_text: String,
    pub processing_status: ProcessingStatus,
    pub confidence_score: Option<f64>,
    pub needs_review: bool,
    pub error_message: Option<String>,
}

impl ExtractionResult {
    /// A terminal failure record carrying whatever text was recovered.
    pub fn failed(extracted_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            extracted_text: extracted_text.into(),
            processing_status: ProcessingStatus::Error,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// A persisted `ExtractionResult`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub id: String,
    #[serde(flatten)]
    pub result: ExtractionResult,
    pub payment_status: Option<PaymentStatus>,
}

impl InvoiceRecord {
    pub fn status(&self) -> ProcessingStatus {
        self.result.processing_status
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntryType {
    Debit,
    Credit,
}

/// Ledger entry data prior to persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerEntry {
    pub invoice_id: String,
    pub transaction_date: NaiveDate,
    pub vendor: String,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    pub gl_account: String,
    pub entry_type: EntryType,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub posting_date: NaiveDate,
    #[serde(flatten)]
    pub entry: NewLedgerEntry,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Quarterly,
    Annual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewBudget {
    pub category: String,
    pub period_type: PeriodType,
    pub period_value: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    #[serde(flatten)]
    pub budget: NewBudget,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ForecastEventType {
    #[serde(rename = "Projected Recurring Expense")]
    RecurringExpense,
    #[serde(rename = "Projected Accounts Payable")]
    AccountsPayable,
    #[serde(rename = "Projected Accounts Receivable")]
    AccountsReceivable,
}

/// A projected cash event. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastEvent {
    pub date: NaiveDate,
    pub vendor: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub event_type: ForecastEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
