use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::context::MessageRole;
use crate::llm_manager::{CompletionRequest, LLMProvider};

/// OpenAI chat completions provider. Also serves API-compatible services
/// such as Groq through `with_base_url`.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatReply,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
}

impl<'a> ChatRequest<'a> {
    /// The profile goes first as a system message, then the conversation.
    pub fn from_completion(model: &'a str, request: &'a CompletionRequest<'a>) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage {
            role: MessageRole::System.as_str(),
            content: request.profile,
        });
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));
        Self {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

impl ChatResponse {
    pub fn into_content(self, provider: &str) -> Result<String> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in {} response", provider))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("{} response was truncated by the max_tokens limit", provider);
        }

        choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow!("No content in {} response", provider))
    }
}

impl OpenAIProvider {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            name: "openai".to_string(),
        }
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        let body = ChatRequest::from_completion(&self.model, request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} API", self.name))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error ({}): {}", self.name, status, error_text));
        }

        let response_text = response.text().await?;
        debug!("Raw {} response: {}", self.name, response_text);

        let parsed: ChatResponse = serde_json::from_str(&response_text).map_err(|e| {
            error!("Failed to parse {} response. Error: {}", self.name, e);
            anyhow!("Failed to parse {} response: {}", self.name, e)
        })?;

        parsed.into_content(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Message;

    #[test]
    fn test_request_puts_profile_first() {
        let messages = vec![Message::user("find events"), Message::assistant("done")];
        let request = CompletionRequest {
            profile: "You are Event Planner.",
            messages: &messages,
            max_tokens: 300,
            temperature: 0.7,
        };
        let body = serde_json::to_value(ChatRequest::from_completion("gpt-4", &request)).unwrap();

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are Event Planner.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][2]["role"], "assistant");
    }

    #[test]
    fn test_response_content() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Go to the fair"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_content("openai").unwrap(), "Go to the fair");
    }

    #[test]
    fn test_response_without_content_is_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(parsed.into_content("openai").is_err());

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(parsed.into_content("openai").is_err());
    }

    #[test]
    fn test_base_url_override() {
        let provider = OpenAIProvider::new(reqwest::Client::new(), "k".to_string(), "m".to_string())
            .with_base_url("https://api.groq.com/openai/v1/".to_string())
            .with_name("groq");
        assert_eq!(provider.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(provider.name(), "groq");
    }
}
