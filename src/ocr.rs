use crate::error::{InvoiceError, Result};
use crate::ingestion::MediaType;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Marker placed between per-page texts of a multi-page document.
pub const PAGE_BREAK_MARKER: &str = "--- Page Break ---";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One text fragment as reported by the OCR engine, in detection order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrDetection {
    pub bounding_box: BoundingBox,
    pub text: String,
}

/// OCR engine abstraction. Calls are blocking.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn read_text(&self, image_bytes: &[u8]) -> Result<Vec<OcrDetection>>;

    /// Frees engine resources at shutdown.
    fn release(&self) {}
}

/// Renders PDF pages to images for OCR. Calls are blocking.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>>;
}

/// Rasterizer for deployments without a PDF renderer installed.
pub struct UnavailableRasterizer;

impl PageRasterizer for UnavailableRasterizer {
    fn rasterize(&self, _pdf_bytes: &[u8], _dpi: u32) -> Result<Vec<Vec<u8>>> {
        Err(InvoiceError::OcrError(
            "Failed to process PDF. No page rasterizer is installed.".to_string(),
        ))
    }
}

/// Turns an admitted document into one text blob.
#[derive(Clone)]
pub struct TextRecovery {
    ocr: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
    dpi: u32,
}

impl TextRecovery {
    pub fn new(ocr: Arc<dyn OcrEngine>, rasterizer: Arc<dyn PageRasterizer>, dpi: u32) -> Self {
        Self {
            ocr,
            rasterizer,
            dpi,
        }
    }

    /// Runs OCR on the blocking thread pool so the async runtime is not starved.
    pub async fn recover(&self, bytes: Arc<Vec<u8>>, media_type: MediaType) -> Result<String> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.recover_blocking(&bytes, media_type))
            .await
            .map_err(|e| InvoiceError::OcrError(format!("OCR worker failed: {}", e)))?
    }

    /// Returns the trimmed text, or an empty string when nothing was detected.
    pub fn recover_blocking(&self, bytes: &[u8], media_type: MediaType) -> Result<String> {
        info!("Starting OCR for {} using {}", media_type, self.ocr.name());

        let text = match media_type {
            MediaType::Pdf => {
                let pages = self.rasterizer.rasterize(bytes, self.dpi)?;
                info!("Rasterized PDF into {} page image(s)", pages.len());

                let mut page_texts = Vec::with_capacity(pages.len());
                for (idx, page) in pages.iter().enumerate() {
                    let detections = self.ocr.read_text(page)?;
                    info!(
                        "OCR for page {} completed. Found {} text boxes.",
                        idx + 1,
                        detections.len()
                    );
                    page_texts.push(join_detections(&detections));
                }
                page_texts.join(&format!("\n\n{}\n\n", PAGE_BREAK_MARKER))
            }
            MediaType::Jpeg | MediaType::Png => {
                let detections = self.ocr.read_text(bytes)?;
                info!(
                    "OCR for image completed. Found {} text boxes.",
                    detections.len()
                );
                join_detections(&detections)
            }
        };

        let text = text.trim().to_string();
        debug!("Recovered {} characters of text", text.len());
        Ok(text)
    }

    pub fn engine_name(&self) -> &str {
        self.ocr.name()
    }

    pub fn release(&self) {
        self.ocr.release();
    }
}

/// Joins fragments in detection order; no reading-order correction is attempted.
fn join_detections(detections: &[OcrDetection]) -> String {
    detections
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
