use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, error, info};

use crate::config::{BackendConfig, Credentials, ProviderKind};
use crate::context::{Message, MessageRole};
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::openai::OpenAIProvider;
use crate::providers::openrouter::OpenRouterProvider;

/// One completion call: a role profile plus the conversation so far.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub profile: &'a str,
    pub messages: &'a [Message],
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Trait representing an LLM provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Name of the provider.
    fn name(&self) -> &str;

    /// Turn a profile and conversation into a reply.
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String>;

    /// Model name of the provider.
    fn model_name(&self) -> &str {
        "Unknown"
    }
}

/// Offline provider used for dry runs: answers with the latest user prompt.
pub struct LocalProvider;

#[async_trait]
impl LLMProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .ok_or_else(|| anyhow!("No user message to answer"))
    }
}

/// Owns the configured provider and the per-call generation settings.
pub struct LLMManager {
    provider: Box<dyn LLMProvider>,
    max_tokens: usize,
    temperature: f32,
}

impl LLMManager {
    pub fn new(provider: Box<dyn LLMProvider>, max_tokens: usize, temperature: f32) -> Self {
        Self {
            provider,
            max_tokens,
            temperature,
        }
    }

    /// Build the provider selected in the configuration.
    pub fn from_config(
        backend: &BackendConfig,
        credentials: &Credentials,
        client: reqwest::Client,
    ) -> Result<Self> {
        let model = backend.model_name();
        let api_key = || {
            credentials
                .backend_api_key
                .clone()
                .with_context(|| format!("No API key configured for provider {}", backend.provider))
        };

        let provider: Box<dyn LLMProvider> = match backend.provider {
            ProviderKind::OpenAI => {
                let mut p = OpenAIProvider::new(client, api_key()?, model);
                if let Some(url) = &backend.base_url {
                    p = p.with_base_url(url.clone());
                }
                Box::new(p)
            }
            ProviderKind::Groq => {
                let url = backend
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string());
                Box::new(
                    OpenAIProvider::new(client, api_key()?, model)
                        .with_base_url(url)
                        .with_name("groq"),
                )
            }
            ProviderKind::OpenRouter => Box::new(OpenRouterProvider::new(client, api_key()?, model)),
            ProviderKind::Anthropic => {
                let mut p = AnthropicProvider::new(client, api_key()?, model);
                if let Some(url) = &backend.base_url {
                    p = p.with_base_url(url.clone());
                }
                Box::new(p)
            }
            ProviderKind::Local => Box::new(LocalProvider),
        };

        info!("Using {} provider with model {}", provider.name(), provider.model_name());
        Ok(Self::new(provider, backend.max_tokens, backend.temperature))
    }

    /// Get the active provider.
    #[allow(dead_code)]
    pub fn provider(&self) -> &dyn LLMProvider {
        &*self.provider
    }

    /// Send a profile and conversation to the provider, once.
    pub async fn complete(&self, profile: &str, messages: &[Message]) -> Result<String> {
        let request = CompletionRequest {
            profile,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(
            "Sending {} messages to {} ({})",
            messages.len(),
            self.provider.name(),
            self.provider.model_name()
        );
        let result = self.provider.complete(&request).await;
        if let Err(e) = &result {
            error!("{} request failed: {:#}", self.provider.name(), e);
        }
        result
    }
}
