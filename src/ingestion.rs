use crate::config::IngestionConfig;
use crate::error::{InvoiceError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Media types the pipeline can recover text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Pdf,
    Jpeg,
    Png,
}

impl MediaType {
    pub fn from_mime(mime: &str) -> Result<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => Ok(Self::Pdf),
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            other => Err(InvoiceError::InputError(format!(
                "Invalid file type: {}",
                other
            ))),
        }
    }

    /// Guesses the media type from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let guess = mime_guess::from_path(path).first_or_octet_stream();
        Self::from_mime(guess.essence_str())
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Cheap checks run before any OCR or LLM cost is incurred.
#[derive(Debug, Clone)]
pub struct IngestionGate {
    max_upload_bytes: usize,
}

impl IngestionGate {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn admit(&self, bytes: &[u8], declared_mime: &str) -> Result<MediaType> {
        let media_type = MediaType::from_mime(declared_mime).map_err(|e| {
            warn!("Rejected upload with declared type '{}'", declared_mime);
            e
        })?;

        if bytes.is_empty() {
            return Err(InvoiceError::InputError("Empty upload".to_string()));
        }

        if bytes.len() > self.max_upload_bytes {
            return Err(InvoiceError::InputError(format!(
                "Upload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.max_upload_bytes
            )));
        }

        info!(
            "Admitted {} upload ({} bytes)",
            media_type,
            bytes.len()
        );
        Ok(media_type)
    }
}
