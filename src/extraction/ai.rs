use crate::config::LlmConfig;
use crate::error::{InvoiceError, Result};
use crate::extraction::prompt::build_extraction_prompt;
use crate::extraction::response::parse_ai_response;
use crate::extraction::{ExtractionDraft, ExtractionStrategy};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            top_p: config.top_p,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

impl SafetySetting {
    /// Invoices are business documents; no category is filtered.
    pub fn permissive() -> Vec<SafetySetting> {
        [
            HarmCategory::HarmCategoryHarassment,
            HarmCategory::HarmCategoryHateSpeech,
            HarmCategory::HarmCategorySexuallyExplicit,
            HarmCategory::HarmCategoryDangerousContent,
        ]
        .into_iter()
        .map(|category| SafetySetting {
            category,
            threshold: HarmBlockThreshold::BlockNone,
        })
        .collect()
    }
}

/// A text-generation service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Whether credentials are configured. When false, no call is attempted.
    fn has_credentials(&self) -> bool;

    async fn generate(
        &self,
        prompt: &str,
        generation: &GenerationSettings,
        safety: &[SafetySetting],
    ) -> Result<String>;
}

/// Asks a language model for the invoice fields and its own review verdict.
pub struct AiExtractionStrategy {
    model: Arc<dyn LanguageModel>,
    generation: GenerationSettings,
    safety: Vec<SafetySetting>,
    timeout: Duration,
}

impl AiExtractionStrategy {
    pub fn new(model: Arc<dyn LanguageModel>, config: &LlmConfig) -> Self {
        Self {
            model,
            generation: GenerationSettings::from(config),
            safety: SafetySetting::permissive(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ExtractionStrategy for AiExtractionStrategy {
    fn name(&self) -> &str {
        "ai-assisted"
    }

    async fn extract(&self, text: &str) -> Result<ExtractionDraft> {
        info!(
            "Attempting data extraction and self-review using {}",
            self.model.name()
        );

        if !self.model.has_credentials() {
            error!("Language model API key not configured. Cannot perform AI extraction.");
            return Err(InvoiceError::AiServiceError(
                "API key not configured.".to_string(),
            ));
        }

        let prompt = build_extraction_prompt(text)?;

        let call = self.model.generate(&prompt, &self.generation, &self.safety);
        let raw = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(InvoiceError::AiServiceError(msg))) => {
                return Err(InvoiceError::AiServiceError(msg))
            }
            Ok(Err(e)) => {
                error!("Error calling language model: {}", e);
                return Err(InvoiceError::AiServiceError(format!(
                    "Communication failed ({}).",
                    e
                )));
            }
            Err(_) => {
                error!(
                    "Language model call timed out after {}s",
                    self.timeout.as_secs()
                );
                return Err(InvoiceError::AiServiceError(
                    "Communication failed (timeout).".to_string(),
                ));
            }
        };

        debug!("Model raw response text: {}", raw);

        let draft = parse_ai_response(&raw)?;
        info!(
            "AI extraction/review complete. Model requested review: {}",
            draft.needs_review
        );
        Ok(draft)
    }
}
