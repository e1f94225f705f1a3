use crate::error::{InvoiceError, Result};
use crate::extraction::{validate_draft, ExtractionDraft};
use crate::schema::{InvoiceFields, LineItem, DEFAULT_CURRENCY};
use chrono::NaiveDate;
use log::{debug, error};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// The JSON document the language model is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiInvoiceResponse {
    #[schemars(description = "The invoice fields extracted from the OCR text")]
    pub extracted_data: AiExtractedData,

    #[schemars(
        description = "True if any key field is uncertain or line items were incomplete; the document is then held for human review"
    )]
    pub needs_review: bool,

    #[serde(default)]
    #[schemars(description = "Short reason for the review flag, or null when no review is needed")]
    pub review_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiExtractedData {
    #[serde(default)]
    #[schemars(description = "Vendor or supplier name, null if not found")]
    pub vendor: Option<String>,

    #[serde(default)]
    #[schemars(description = "Invoice date as YYYY-MM-DD, null if not found or ambiguous")]
    pub invoice_date: Option<String>,

    #[serde(default)]
    #[schemars(description = "Payment due date as YYYY-MM-DD, null if not found")]
    pub due_date: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    #[schemars(with = "Option<String>", description = "Invoice identifier, null if not found")]
    pub invoice_number: Option<String>,

    #[serde(default)]
    #[schemars(description = "Line items; an empty array when none are identifiable")]
    pub line_items: Option<Vec<AiLineItem>>,

    #[serde(default)]
    #[schemars(description = "Amount before tax, null when uncertain")]
    pub subtotal: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Total tax, null when uncertain")]
    pub tax: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Final amount due, null when uncertain")]
    pub total_amount: Option<f64>,

    #[serde(default)]
    #[schemars(description = "ISO currency code, USD when not stated")]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiLineItem {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub line_total: Option<f64>,
}

impl AiInvoiceResponse {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AiInvoiceResponse)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Invoice numbers sometimes come back as bare JSON numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number for invoiceNumber, got {}",
            other
        ))),
    }
}

/// Removes a surrounding markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Decodes a model response into a validated draft.
///
/// Failure modes, in the order they are checked:
/// - not JSON at all: `AiServiceError` ("Could not parse AI response.")
/// - JSON without `extractedData` or `needsReview`: `AiServiceError` ("Invalid response structure from AI.")
/// - fields of the wrong type, non-ISO dates, negative amounts: `ValidationError`
pub fn parse_ai_response(raw: &str) -> Result<ExtractionDraft> {
    let cleaned = strip_code_fences(raw);

    let value: serde_json::Value = serde_json::from_str(cleaned).map_err(|e| {
        error!("Failed to decode JSON response from model: {}", e);
        debug!("Model response text was: {}", raw);
        InvoiceError::AiServiceError("Could not parse AI response.".to_string())
    })?;

    let has_required_keys = value
        .as_object()
        .map(|obj| obj.contains_key("extractedData") && obj.contains_key("needsReview"))
        .unwrap_or(false);
    if !has_required_keys {
        error!("Model response missing required keys ('extractedData', 'needsReview')");
        return Err(InvoiceError::AiServiceError(
            "Invalid response structure from AI.".to_string(),
        ));
    }

    let response: AiInvoiceResponse = serde_json::from_value(value)
        .map_err(|e| InvoiceError::ValidationError(e.to_string()))?;

    let draft = ExtractionDraft {
        fields: map_extracted_data(response.extracted_data)?,
        needs_review: response.needs_review,
        review_reason: if response.needs_review {
            response.review_reason.filter(|r| !r.trim().is_empty())
        } else {
            None
        },
        confidence_score: None,
    };

    validate_draft(&draft)?;
    Ok(draft)
}

fn map_extracted_data(data: AiExtractedData) -> Result<InvoiceFields> {
    let line_items = data
        .line_items
        .unwrap_or_default()
        .into_iter()
        .map(|item| {
            let defaults = LineItem::default();
            LineItem {
                description: item.description.unwrap_or(defaults.description),
                quantity: item.quantity.unwrap_or(defaults.quantity),
                price: item.price.unwrap_or(defaults.price),
                line_total: item.line_total.unwrap_or(defaults.line_total),
            }
        })
        .collect();

    Ok(InvoiceFields {
        vendor: non_blank(data.vendor),
        invoice_date: parse_iso_date("invoiceDate", data.invoice_date)?,
        due_date: parse_iso_date("dueDate", data.due_date)?,
        invoice_number: non_blank(data.invoice_number),
        line_items,
        subtotal: data.subtotal,
        tax: data.tax,
        total_amount: data.total_amount,
        currency: non_blank(data.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_iso_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>> {
    match non_blank(value) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                InvoiceError::ValidationError(format!(
                    "{} '{}' is not a YYYY-MM-DD date",
                    field, s
                ))
            }),
    }
}
