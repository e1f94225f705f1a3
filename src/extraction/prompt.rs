// Prompt template for invoice field extraction with self-review.

use crate::error::Result;
use crate::extraction::response::AiInvoiceResponse;

pub const EXTRACTION_INSTRUCTIONS: &str = r#"
You are an expert accountant. Reason step by step, carefully.
Analyze the following text extracted from an invoice using OCR. Extract the specified fields accurately.
After extraction, critically review the extracted values against the source text.
Return the result ONLY as a valid JSON object. Do not include any introductory text, explanations, or markdown formatting like ```json.

The JSON object must have the following keys:
- "extractedData": (object) The extracted invoice fields:
    - "vendor": (string) Name of the vendor/supplier. Use null if not found or highly uncertain.
    - "invoiceDate": (string) Main date of the invoice in "YYYY-MM-DD" format. Use null if not found, ambiguous, or it cannot be formatted correctly.
    - "dueDate": (string) Payment due date in "YYYY-MM-DD" format. Use null if not found or it cannot be formatted correctly.
    - "invoiceNumber": (string) Unique invoice identifier. Use null if not found or highly uncertain.
    - "lineItems": (array) Each item has "description" (string), "quantity" (number, default 1.0), "price" (number, default 0.0), "lineTotal" (number, default 0.0). Return [] if none are clearly identifiable.
    - "subtotal": (number) Total before taxes. Use null if not found or highly uncertain.
    - "tax": (number) Total tax amount. Use null if not found or highly uncertain.
    - "totalAmount": (number) Final total amount due. Use null if not found or highly uncertain.
    - "currency": (string) Currency code such as "USD" or "EUR". Default to "USD" if not found.
- "needsReview": (boolean) true if you have low confidence in any key field (ambiguous vendor, unparseable date, unclear total, inconsistent sums) or line item extraction was difficult or incomplete. Otherwise false.
- "reviewReason": (string) When needsReview is true, a brief reason such as "Ambiguous invoice date format". When needsReview is false, null or an empty string.

Prioritize accuracy. If a value is uncertain or cannot be reliably extracted, set it to null inside "extractedData" and set "needsReview" to true with a reason. Dates must be strictly "YYYY-MM-DD".
"#;

/// Builds the full prompt with the OCR text interpolated.
pub fn build_extraction_prompt(ocr_text: &str) -> Result<String> {
    let schema = AiInvoiceResponse::schema_as_json()?;

    Ok(format!(
        "{}\nThe JSON object must validate against this JSON Schema:\n{}\n\n\
         OCR Text to Analyze:\n\
         --- START OF TEXT ---\n\
         {}\n\
         --- END OF TEXT ---\n\n\
         JSON Output:\n",
        EXTRACTION_INSTRUCTIONS.trim(),
        schema,
        ocr_text
    ))
}
