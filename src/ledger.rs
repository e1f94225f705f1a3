use crate::chart_of_accounts::categorize_vendor;
use crate::schema::{EntryType, InvoiceRecord, NewLedgerEntry, ProcessingStatus, DEFAULT_CURRENCY};
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::BTreeSet;

pub const UNKNOWN_VENDOR: &str = "Unknown Vendor";

/// Turns a persisted record into the ledger entry it implies, if any.
///
/// Only `Processed` records with a total amount produce an entry. A `Processed`
/// record without a total stays as it is, with no financial effect.
pub fn derive_ledger_entry(record: &InvoiceRecord, today: NaiveDate) -> Option<NewLedgerEntry> {
    match record.status() {
        ProcessingStatus::Processed => {}
        ProcessingStatus::Pending | ProcessingStatus::NeedsReview | ProcessingStatus::Error => {
            return None
        }
    }

    let fields = &record.result.fields;
    let Some(amount) = fields.total_amount else {
        warn!(
            "Invoice {} is Processed but has no total amount; skipping ledger entry",
            record.id
        );
        return None;
    };

    let gl_account = categorize_vendor(fields.vendor.as_deref());
    info!(
        "Assigned GL account '{}' to invoice {} based on vendor",
        gl_account, record.id
    );

    let currency = if fields.currency.trim().is_empty() {
        DEFAULT_CURRENCY.to_string()
    } else {
        fields.currency.clone()
    };

    Some(NewLedgerEntry {
        invoice_id: record.id.clone(),
        transaction_date: fields.invoice_date.unwrap_or(today),
        vendor: fields
            .vendor
            .clone()
            .unwrap_or_else(|| UNKNOWN_VENDOR.to_string()),
        description: format!(
            "Invoice {}",
            fields.invoice_number.as_deref().unwrap_or("N/A")
        ),
        amount,
        currency,
        gl_account: gl_account.to_string(),
        entry_type: EntryType::Debit,
        payment_method: None,
        tags: BTreeSet::new(),
    })
}
