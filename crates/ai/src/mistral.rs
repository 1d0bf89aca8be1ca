// Mistral adapter (chat-completions wire format)

use async_trait::async_trait;

use crate::openai::ChatCompletions;
use crate::provider::{GenerationConfig, ProviderError, ProviderPort};

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

pub struct MistralProvider {
    inner: ChatCompletions,
}

impl MistralProvider {
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
impl ProviderPort for MistralProvider {
    fn name(&self) -> &str {
        "mistral"
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
