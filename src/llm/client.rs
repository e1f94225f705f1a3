use crate::config::LlmConfig;
use crate::error::{InvoiceError, Result};
use crate::extraction::{GenerationSettings, LanguageModel, SafetySetting};
use crate::llm::types::*;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// REST client for Gemini `generateContent`.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// A client without a key can be built; every extraction through it fails
    /// with "API key not configured." and no request is sent.
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.api_key.clone(), config.model.clone())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(
        &self,
        prompt: &str,
        generation: &GenerationSettings,
        safety: &[SafetySetting],
    ) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| InvoiceError::AiServiceError("API key not configured.".to_string()))?;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part::Text {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: generation,
            safety_settings: safety,
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(InvoiceError::AiServiceError(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;

        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            warn!("Gemini blocked the prompt: {}", reason);
            return Err(InvoiceError::AiServiceError(format!(
                "Prompt blocked by model ({}).",
                reason
            )));
        }

        let candidate = body
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| InvoiceError::AiServiceError("No candidates returned.".to_string()))?;
        debug!("Gemini finish reason: {:?}", candidate.finish_reason);

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|Part::Text { text }| text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(InvoiceError::AiServiceError(
                "Model returned no text.".to_string(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_means_no_credentials() {
        assert!(!GeminiClient::new(Some("  ".to_string()), "gemini-2.0-flash").has_credentials());
        assert!(!GeminiClient::new(None, "gemini-2.0-flash").has_credentials());
        assert!(GeminiClient::new(Some("key".to_string()), "gemini-2.0-flash").has_credentials());
    }

    #[test]
    fn test_from_config_uses_model_name() {
        let client = GeminiClient::from_config(&LlmConfig::default());
        assert_eq!(client.name(), "gemini-2.0-flash");
    }
}
