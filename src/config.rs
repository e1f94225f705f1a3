use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub max_upload_bytes: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Rasterization resolution for PDF pages.
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { dpi: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_output_tokens: 16384,
            top_p: 0.95,
            request_timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub lookback_days: u64,
    pub min_days_ahead: u32,
    pub max_days_ahead: u32,
    pub recurrence_min_gap_days: i64,
    pub recurrence_max_gap_days: i64,
    /// Maximum relative difference between two amounts still treated as the same bill.
    pub recurrence_amount_tolerance: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            lookback_days: 60,
            min_days_ahead: 7,
            max_days_ahead: 90,
            recurrence_min_gap_days: 25,
            recurrence_max_gap_days: 35,
            recurrence_amount_tolerance: 0.10,
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from environment variables, keeping defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.llm.api_key = std::env::var("GOOGLE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        if let Ok(model) = std::env::var("INVOICE_LLM_MODEL") {
            if !model.trim().is_empty() {
                config.llm.model = model;
            }
        }

        config.ocr.dpi = std::env::var("INVOICE_OCR_DPI")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.ocr.dpi);

        config.ingestion.max_upload_bytes = std::env::var("INVOICE_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config.ingestion.max_upload_bytes);

        config
    }
}
