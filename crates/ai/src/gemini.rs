// Google Gemini adapter (generateContent)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::prompt::format_prompt;
use crate::provider::{read_success_body, transport_error, GenerationConfig, ProviderError, ProviderPort};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: WireGenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn text_content(text: String) -> Content {
    Content {
        parts: vec![Part { text: Some(text) }],
    }
}

/// Candidate text, else the block reason, else empty
fn interpret(response: GenerateResponse) -> Result<String, ProviderError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .and_then(|p| p.text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if let Some(text) = text {
        return Ok(text);
    }

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::ContentBlocked(reason));
    }

    Err(ProviderError::EmptyResponse)
}

// ============================================================================
// Adapter
// ============================================================================

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: reqwest::Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProviderPort for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        system_role: &str,
        prompt: &str,
        input: &str,
        config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            system_instruction: text_content(system_role.to_string()),
            contents: vec![text_content(format_prompt(
                prompt,
                input,
                config.format,
                &config.structure,
            ))],
            generation_config: WireGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, config.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_success_body(response).await?;
        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Transport(format!("unexpected response: {}", e)))?;
        interpret(parsed)
    }
}
