use crate::error::InvoiceError;
use crate::extraction::ExtractionDraft;
use crate::schema::{ExtractionResult, InvoiceFields, ProcessingStatus};
use log::info;

pub const EMPTY_TEXT_MESSAGE: &str = "OCR Error: No text could be extracted.";
pub const MISSING_REVIEW_REASON: &str = "Reason not provided by AI.";

/// Everything the classifier needs to know about one document.
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// OCR produced no text; no strategy was run.
    EmptyText,
    /// The strategy failed terminally.
    Failed(InvoiceError),
    Extracted(ExtractionDraft),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: ProcessingStatus,
    pub needs_review: bool,
    pub error_message: Option<String>,
}

/// Maps an outcome to its processing status. Pure: equal input gives equal output.
pub fn classify(outcome: &ExtractionOutcome) -> Classification {
    match outcome {
        ExtractionOutcome::EmptyText => Classification {
            status: ProcessingStatus::Error,
            needs_review: false,
            error_message: Some(EMPTY_TEXT_MESSAGE.to_string()),
        },
        ExtractionOutcome::Failed(err) => Classification {
            status: ProcessingStatus::Error,
            needs_review: matches!(err, InvoiceError::ValidationError(_)),
            error_message: Some(err.record_message()),
        },
        ExtractionOutcome::Extracted(draft) if draft.needs_review => Classification {
            status: ProcessingStatus::NeedsReview,
            needs_review: true,
            error_message: Some(
                draft
                    .review_reason
                    .clone()
                    .unwrap_or_else(|| MISSING_REVIEW_REASON.to_string()),
            ),
        },
        ExtractionOutcome::Extracted(_) => Classification {
            status: ProcessingStatus::Processed,
            needs_review: false,
            error_message: None,
        },
    }
}

/// Builds the record to persist from the recovered text and the strategy outcome.
pub fn build_result(extracted_text: String, outcome: ExtractionOutcome) -> ExtractionResult {
    let classification = classify(&outcome);
    info!("Document classified as {}", classification.status);

    let (fields, confidence_score) = match outcome {
        ExtractionOutcome::Extracted(draft) => (draft.fields, draft.confidence_score),
        ExtractionOutcome::EmptyText | ExtractionOutcome::Failed(_) => {
            (InvoiceFields::default(), None)
        }
    };

    ExtractionResult {
        fields,
        extracted_text,
        processing_status: classification.status,
        confidence_score,
        needs_review: classification.needs_review,
        error_message: classification.error_message,
    }
}
