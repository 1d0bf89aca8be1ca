// Chat-completions adapter (OpenAI)
//
// Mistral speaks the same wire format, so the request/response handling
// lives here and `mistral.rs` only supplies its endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::prompt::format_prompt;
use crate::provider::{read_success_body, transport_error, GenerationConfig, ProviderError, ProviderPort};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// One chat-completions endpoint (`{base_url}/v1/chat/completions`)
pub(crate) struct ChatCompletions {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ChatCompletions {
    pub(crate) fn new(client: reqwest::Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) async fn complete(
        &self,
        system_role: &str,
        prompt: &str,
        input: &str,
        config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        let user_text = format_prompt(prompt, input, config.format, &config.structure);
        let request = ChatRequest {
            model: &config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_role,
                },
                ChatMessage {
                    role: "user",
                    content: &user_text,
                },
            ],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_success_body(response).await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Transport(format!("unexpected response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

// ============================================================================
// Adapter
// ============================================================================

pub struct ChatGptProvider {
    inner: ChatCompletions,
}

impl ChatGptProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(client: reqwest::Client, api_key: String, base_url: String) -> Self {
        Self {
            inner: ChatCompletions::new(client, api_key, base_url),
        }
    }
}

#[async_trait]
impl ProviderPort for ChatGptProvider {
    fn name(&self) -> &str {
        "chatgpt"
    }

    async fn generate(
        &self,
        system_role: &str,
        prompt: &str,
        input: &str,
        config: &GenerationConfig,
    ) -> Result<String, ProviderError> {
        self.inner.complete(system_role, prompt, input, config).await
    }
}
