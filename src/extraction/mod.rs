//! Field extraction strategies.
//!
//! Both strategies consume recovered OCR text and produce an [`ExtractionDraft`]: the structured
//! invoice fields plus the strategy's own review verdict. Any `Err` returned from
//! [`ExtractionStrategy::extract`] is terminal for the document.

pub mod ai;
pub mod prompt;
pub mod response;
pub mod rules;

pub use ai::{
    AiExtractionStrategy, GenerationSettings, HarmBlockThreshold, HarmCategory, LanguageModel,
    SafetySetting,
};
pub use response::{parse_ai_response, AiInvoiceResponse};
pub use rules::RuleBasedStrategy;

use crate::error::{InvoiceError, Result};
use crate::schema::InvoiceFields;
use async_trait::async_trait;

/// Output of a successful strategy run, before status classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionDraft {
    pub fields: InvoiceFields,
    pub needs_review: bool,
    pub review_reason: Option<String>,
    pub confidence_score: Option<f64>,
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, text: &str) -> Result<ExtractionDraft>;
}

/// Structural checks applied to every draft regardless of which strategy produced it.
pub fn validate_draft(draft: &ExtractionDraft) -> Result<()> {
    if let Some(score) = draft.confidence_score {
        if !(0.0..=1.0).contains(&score) {
            return Err(InvoiceError::ValidationError(format!(
                "confidenceScore {} is outside [0, 1]",
                score
            )));
        }
    }
    validate_fields(&draft.fields)
}

pub fn validate_fields(fields: &InvoiceFields) -> Result<()> {
    for (name, value) in [
        ("subtotal", fields.subtotal),
        ("tax", fields.tax),
        ("totalAmount", fields.total_amount),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(InvoiceError::ValidationError(format!(
                    "{} must be a non-negative number, got {}",
                    name, v
                )));
            }
        }
    }

    if fields.currency.trim().is_empty() {
        return Err(InvoiceError::ValidationError(
            "currency must not be empty".to_string(),
        ));
    }

    for (idx, item) in fields.line_items.iter().enumerate() {
        if ![item.quantity, item.price, item.line_total]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(InvoiceError::ValidationError(format!(
                "lineItems[{}] contains a non-numeric value",
                idx
            )));
        }
    }

    Ok(())
}
