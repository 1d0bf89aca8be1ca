// Provider port and shared adapter plumbing
//
// Every backend satisfies `ProviderPort`; the batch job is written once
// against the trait. Failures are classified into `ProviderError`, whose
// `user_message()` is what ends up in the cell.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use promptgrid_config::ai::ResolvedAIConfig;
use promptgrid_config::settings::{AIProvider, ResponseFormat, ResponseStructure, Settings};
use thiserror::Error;

use crate::gemini::GeminiProvider;
use crate::mistral::MistralProvider;
use crate::openai::ChatGptProvider;

/// Instruction sent as the system role with every request
pub const SYSTEM_ROLE: &str = "You are an expert assistant for analysing and processing data.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-request generation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    /// 0.0 ..= 2.0
    pub temperature: f32,
    /// 1 ..= 4096
    pub max_tokens: u32,
    pub format: ResponseFormat,
    pub structure: ResponseStructure,
}

impl GenerationConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let settings = settings.clone().validated();
        Self {
            model: settings.effective_model().to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            format: settings.response_format,
            structure: settings.response_structure,
        }
    }

    pub fn from_resolved(config: &ResolvedAIConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            format: config.response_format,
            structure: config.response_structure.clone(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("API key rejected")]
    Unauthenticated,
    #[error("provider quota exceeded")]
    QuotaExceeded,
    #[error("content blocked: {0}")]
    ContentBlocked(String),
    #[error("provider returned no text")]
    EmptyResponse,
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Fixed text written into the cell in place of a result
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::MissingCredential => {
                "To get started, configure an API key for the selected AI provider \
                 (system keychain or PROMPTGRID_<PROVIDER>_KEY)."
                    .to_string()
            }
            ProviderError::Unauthenticated => {
                "The API key is not valid. Check that the complete key is configured and try again."
                    .to_string()
            }
            ProviderError::QuotaExceeded => {
                "API quota exceeded. Try again later or check the limits of your provider account."
                    .to_string()
            }
            ProviderError::ContentBlocked(reason) => {
                format!("Content blocked by the AI safety rules: {}", reason)
            }
            ProviderError::EmptyResponse => {
                "No response from the AI. Try rephrasing your request.".to_string()
            }
            ProviderError::Transport(_) => {
                "Could not reach the AI. Check your internet connection and try again.".to_string()
            }
        }
    }
}

#[async_trait]
pub trait ProviderPort: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    async fn generate(
        &self,
        system_role: &str,
        prompt: &str,
        input: &str,
        config: &GenerationConfig,
    ) -> Result<String, ProviderError>;
}

/// Provider used when no key is available: every call reports the missing
/// credential so each row gets the configuration guidance.
#[derive(Debug, Clone)]
pub struct UnconfiguredProvider {
    provider: AIProvider,
}

impl UnconfiguredProvider {
    pub fn new(provider: AIProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ProviderPort for UnconfiguredProvider {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn generate(
        &self,
        _system_role: &str,
        _prompt: &str,
        _input: &str,
        _config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::MissingCredential)
    }
}

/// Build the adapter selected by the resolved configuration
pub fn build_provider(config: &ResolvedAIConfig) -> Result<Arc<dyn ProviderPort>, ProviderError> {
    let Some(key) = config.api_key.clone() else {
        log::warn!("No API key for {}; rows will receive setup guidance", config.provider.label());
        return Ok(Arc::new(UnconfiguredProvider::new(config.provider)));
    };

    let client = http_client()?;
    let provider: Arc<dyn ProviderPort> = match config.provider {
        AIProvider::Gemini => Arc::new(GeminiProvider::new(client, key)),
        AIProvider::ChatGpt => Arc::new(ChatGptProvider::new(client, key)),
        AIProvider::Mistral => Arc::new(MistralProvider::new(client, key)),
    };
    Ok(provider)
}

/// HTTP client shared by the adapters
pub fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Transport(e.to_string()))
}

/// Map a transport-level reqwest failure. The URL is stripped so keys passed
/// in query strings never reach logs.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport(err.without_url().to_string())
}

/// Classify a non-success HTTP response from any provider
pub(crate) fn classify_failure(status: u16, detail: &str) -> ProviderError {
    let lower = detail.to_lowercase();
    if status == 401
        || status == 403
        || lower.contains("api key not valid")
        || lower.contains("invalid_api_key")
        || lower.contains("invalid api key")
    {
        ProviderError::Unauthenticated
    } else if status == 429 || lower.contains("quota") {
        ProviderError::QuotaExceeded
    } else {
        ProviderError::Transport(format!("HTTP {}: {}", status, detail))
    }
}

/// Pull a readable message out of an error body. Handles the
/// `{"error": {"message", "code"}}` shape (Gemini, OpenAI) and the flat
/// `{"message"}` shape (Mistral); falls back to the raw text.
pub(crate) fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    let mut parts = Vec::new();
    if let Some(error) = value.get("error") {
        if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
            parts.push(message.to_string());
        }
        if let Some(code) = error.get("code").and_then(|c| c.as_str()) {
            parts.push(code.to_string());
        }
        if let Some(message) = error.as_str() {
            parts.push(message.to_string());
        }
    }
    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        parts.push(message.to_string());
    }

    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join(" / ")
    }
}

/// Read a response, classifying non-success statuses
pub(crate) async fn read_success_body(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_failure(status.as_u16(), &error_detail(&body)))
    }
}
