use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

use crate::llm_manager::{CompletionRequest, LLMProvider};
use crate::providers::openai::{ChatRequest, ChatResponse};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
    pub model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            model,
            api_key,
            client,
        }
    }
}

#[async_trait]
impl LLMProvider for OpenRouterProvider {
    fn name(&self) -> &str { "openrouter" }
    fn model_name(&self) -> &str { &self.model }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        let body = ChatRequest::from_completion(&self.model, request);
        let resp = self.client
            .post(OPENROUTER_URL)
            .bearer_auth(&self.api_key)
            .header("X-Title", "event_scout")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to OpenRouter")?;
        if !resp.status().is_success() {
            return Err(anyhow!("OpenRouter API error: {}", resp.status()));
        }
        let parsed: ChatResponse = resp.json().await.context("Failed to parse OpenRouter response")?;
        parsed.into_content("OpenRouter")
    }
}
