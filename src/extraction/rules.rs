use crate::error::Result;
use crate::extraction::{validate_draft, ExtractionDraft, ExtractionStrategy};
use crate::schema::InvoiceFields;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use regex::Regex;
use std::sync::LazyLock;

/// Below this score the draft is flagged for review.
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Date formats tried in order; the first successful parse wins.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATE_TOKEN: &str = r"(\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}[-/]\d{1,2}[-/]\d{4}|[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+[A-Za-z]{3,9}\.?,?\s+\d{4})";

const AMOUNT_TOKEN: &str = r"(?:[A-Z]{3}\s*)?[$€£]?\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)";

static INVOICE_NUMBER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)invoice\s*(?:no\.?|number|num\.?)\s*[:#]?\s*([A-Z0-9][A-Z0-9\-/]*)")
            .expect("valid regex"),
        Regex::new(r"(?i)\binv(?:oice)?\s*#\s*([A-Z0-9][A-Z0-9\-/]*)").expect("valid regex"),
        Regex::new(r"#\s*([A-Z0-9][A-Z0-9\-]{1,})").expect("valid regex"),
    ]
});

static INVOICE_DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(&format!(
            r"(?i)(?:invoice\s+date|issue\s+date|date\s+issued|date\s+of\s+issue)\s*[:\-]?\s*{}",
            DATE_TOKEN
        ))
        .expect("valid regex"),
        Regex::new(&format!(r"(?i)\bdated?\s*[:\-]?\s*{}", DATE_TOKEN)).expect("valid regex"),
    ]
});

static DUE_DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(&format!(
            r"(?i)(?:due\s+date|payment\s+due|due\s+by|due\s+on)\s*[:\-]?\s*{}",
            DATE_TOKEN
        ))
        .expect("valid regex"),
        Regex::new(&format!(r"(?i)\bdue\s*[:\-]?\s*{}", DATE_TOKEN)).expect("valid regex"),
    ]
});

static TOTAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(&format!(
            r"(?i)(?:total\s+due|amount\s+due|balance\s+due|grand\s+total|total\s+amount)\s*[:\-]?\s*{}",
            AMOUNT_TOKEN
        ))
        .expect("valid regex"),
        Regex::new(&format!(r"(?i)\btotal\b\s*[:\-]?\s*{}", AMOUNT_TOKEN)).expect("valid regex"),
    ]
});

/// Pattern-matching fallback that needs no external service.
///
/// Line items, subtotal and tax are never extracted, so every draft is flagged for review.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedStrategy;

impl RuleBasedStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Pure and deterministic: identical text always yields an identical draft.
    pub fn extract_fields(&self, text: &str) -> ExtractionDraft {
        let invoice_number = first_capture(&INVOICE_NUMBER_PATTERNS, text, |_, m| {
            Some(m.to_string())
        });
        let invoice_date = first_capture(&INVOICE_DATE_PATTERNS, text, |prefix, m| {
            // "Due Date: ..." must not count as the invoice date.
            if prefix.trim_end().to_ascii_lowercase().ends_with("due") {
                return None;
            }
            parse_date(m)
        });
        let due_date = first_capture(&DUE_DATE_PATTERNS, text, |_, m| parse_date(m));
        let total_amount = first_capture(&TOTAL_PATTERNS, text, |_, m| parse_amount(m));
        let vendor = guess_vendor(text);

        let found = [
            invoice_number.is_some(),
            invoice_date.is_some(),
            total_amount.is_some(),
            vendor.is_some(),
        ]
        .iter()
        .filter(|f| **f)
        .count();
        let confidence = found as f64 / 4.0;

        let mut reason =
            "Rule-based extraction does not capture line items, subtotal or tax.".to_string();
        if confidence < REVIEW_CONFIDENCE_THRESHOLD {
            reason.push_str(&format!(
                " Low confidence ({:.2}): only {} of 4 key fields found.",
                confidence, found
            ));
        }

        debug!(
            "Rule-based extraction found {} of 4 key fields (confidence {:.2})",
            found, confidence
        );

        ExtractionDraft {
            fields: InvoiceFields {
                vendor,
                invoice_date,
                due_date,
                invoice_number,
                total_amount,
                ..Default::default()
            },
            needs_review: true,
            review_reason: Some(reason),
            confidence_score: Some(confidence),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for RuleBasedStrategy {
    fn name(&self) -> &str {
        "rule-based"
    }

    async fn extract(&self, text: &str) -> Result<ExtractionDraft> {
        info!("Attempting rule-based data extraction");
        let draft = self.extract_fields(text);
        validate_draft(&draft)?;
        Ok(draft)
    }
}

/// Tries each pattern in order, and each match of a pattern in text order, until `accept` yields a value.
fn first_capture<T>(
    patterns: &[Regex],
    text: &str,
    accept: impl Fn(&str, &str) -> Option<T>,
) -> Option<T> {
    patterns.iter().find_map(|pattern| {
        pattern.captures_iter(text).find_map(|caps| {
            let whole = caps.get(0)?;
            let group = caps.get(1)?;
            accept(&text[..whole.start()], group.as_str())
        })
    })
}

pub fn parse_date(token: &str) -> Option<NaiveDate> {
    let normalized = token
        .replace([',', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
}

fn parse_amount(token: &str) -> Option<f64> {
    token.replace(',', "").parse::<f64>().ok()
}

/// First non-blank line without "invoice" whose length is strictly between 3 and 50 characters.
fn guess_vendor(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| {
            let len = line.chars().count();
            !line.to_lowercase().contains("invoice") && len > 3 && len < 50
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Staples Business Advantage\n\
        Invoice Number: INV-2024-001\n\
        Invoice Date: 01/15/2024\n\
        Due Date: February 14, 2024\n\
        Subtotal: $90.00\n\
        Tax: $10.00\n\
        Total Due: $1,100.50\n";

    #[test]
    fn test_extracts_all_key_fields() {
        let draft = RuleBasedStrategy::new().extract_fields(SAMPLE);
        assert_eq!(
            draft.fields.vendor.as_deref(),
            Some("Staples Business Advantage")
        );
        assert_eq!(draft.fields.invoice_number.as_deref(), Some("INV-2024-001"));
        assert_eq!(
            draft.fields.invoice_date,
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(draft.fields.due_date, NaiveDate::from_ymd_opt(2024, 2, 14));
        assert_eq!(draft.fields.total_amount, Some(1100.5));
        assert_eq!(draft.confidence_score, Some(1.0));
    }

    #[test]
    fn test_always_needs_review_and_never_line_items() {
        let draft = RuleBasedStrategy::new().extract_fields(SAMPLE);
        assert!(draft.needs_review);
        assert!(draft.fields.line_items.is_empty());
        assert_eq!(draft.fields.subtotal, None);
        assert_eq!(draft.fields.tax, None);
    }

    #[test]
    fn test_low_confidence_reason() {
        let draft = RuleBasedStrategy::new().extract_fields("Total: 42.00");
        assert_eq!(draft.fields.total_amount, Some(42.0));
        assert_eq!(draft.confidence_score, Some(0.5));
        assert!(draft.needs_review);
        assert!(draft
            .review_reason
            .as_deref()
            .unwrap()
            .contains("Low confidence"));
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        for text in ["", "x", SAMPLE, "Invoice\n\n\nTotal: abc"] {
            let score = RuleBasedStrategy::new()
                .extract_fields(text)
                .confidence_score
                .unwrap();
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
            if score < REVIEW_CONFIDENCE_THRESHOLD {
                assert!(RuleBasedStrategy::new().extract_fields(text).needs_review);
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let strategy = RuleBasedStrategy::new();
        assert_eq!(strategy.extract_fields(SAMPLE), strategy.extract_fields(SAMPLE));
    }

    #[test]
    fn test_vendor_heuristic_bounds() {
        assert_eq!(guess_vendor("INVOICE\nABC\nAcme Ltd"), Some("Acme Ltd".to_string()));
        assert_eq!(guess_vendor("   \nInvoice #9"), None);
        let long = "x".repeat(50);
        assert_eq!(guess_vendor(&long), None);
    }

    #[test]
    fn test_due_date_not_mistaken_for_invoice_date() {
        let draft = RuleBasedStrategy::new().extract_fields("Due Date: 2024-03-01");
        assert_eq!(draft.fields.invoice_date, None);
        assert_eq!(draft.fields.due_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn test_date_format_priority() {
        // Ambiguous day/month resolves month-first because %m/%d/%Y precedes %d/%m/%Y.
        assert_eq!(parse_date("03/04/2024"), NaiveDate::from_ymd_opt(2024, 3, 4));
        // Day above 12 only parses day-first.
        assert_eq!(parse_date("25/04/2024"), NaiveDate::from_ymd_opt(2024, 4, 25));
        assert_eq!(parse_date("Jan. 5, 2024"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_date("5 March 2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_subtotal_is_not_total() {
        let draft = RuleBasedStrategy::new().extract_fields("Subtotal: 90.00");
        assert_eq!(draft.fields.total_amount, None);
    }

    #[tokio::test]
    async fn test_strategy_trait_wraps_extract_fields() {
        let strategy = RuleBasedStrategy::new();
        let draft = strategy.extract(SAMPLE).await.unwrap();
        assert_eq!(draft, strategy.extract_fields(SAMPLE));
    }
}
