use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvoiceError {
    #[error("Input error: {0}")]
    InputError(String),

    #[error("OCR error: {0}")]
    OcrError(String),

    #[error("AI service error: {0}")]
    AiServiceError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Forecast source unavailable: {source_name}")]
    ForecastSourceUnavailable { source_name: String },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl InvoiceError {
    /// Message stored on a record that ended in `Error` status.
    pub fn record_message(&self) -> String {
        match self {
            Self::InputError(msg) => format!("Input Error: {}", msg),
            Self::OcrError(msg) => format!("OCR Error: {}", msg),
            Self::AiServiceError(msg) => format!("AI Service Error: {}", msg),
            Self::ValidationError(msg) => {
                format!("Data Validation Error after AI processing: {}", msg)
            }
            Self::PersistenceError(msg) => format!("Transaction Creation Error: {}", msg),
            Self::ForecastSourceUnavailable { source_name } => {
                format!("Forecast source unavailable: {}", source_name)
            }
            Self::DateError(msg) => format!("Date Error: {}", msg),
            Self::SerializationError(e) => format!("Serialization Error: {}", e),
            Self::IoError(e) => format!("IO Error: {}", e),
            #[cfg(feature = "gemini")]
            Self::HttpError(e) => format!("AI Service Error: Communication failed ({}).", e),
        }
    }

    pub fn unavailable(source_name: impl Into<String>) -> Self {
        Self::ForecastSourceUnavailable {
            source_name: source_name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InvoiceError>;
