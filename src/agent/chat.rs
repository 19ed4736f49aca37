//! OpenAI-compatible chat completions backend
//!
//! Works with any `/chat/completions` endpoint (xAI, OpenAI, local
//! gateways). The API key is read from an environment variable named in
//! config so secrets never live in config files.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::adapter::AgentBackend;
use super::protocol::PromptContext;
use crate::error::{ConclaveError, Result};

/// Chat API backend configuration
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    pub api_key: String,
    /// API base URL, without the `/chat/completions` suffix
    pub base_url: String,
    pub timeout: Duration,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.x.ai/v1".to_string(),
            timeout: Duration::from_secs(25),
            model: "grok-4-1-fast-reasoning".to_string(),
            temperature: 0.3,
            max_tokens: 800,
        }
    }
}

impl ChatApiConfig {
    /// Read the key from the named env var, leaving it empty if unset
    pub fn with_key_from_env(mut self, var: &str) -> Self {
        self.api_key = std::env::var(var).unwrap_or_default();
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Text backend over HTTP chat completions
pub struct ChatCompletionsBackend {
    name: String,
    config: ChatApiConfig,
    http: Client,
}

impl ChatCompletionsBackend {
    pub fn new(name: impl Into<String>, config: ChatApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConclaveError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            config,
            http,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn build_request(&self, prompt: &PromptContext) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        }
    }
}

#[async_trait]
impl AgentBackend for ChatCompletionsBackend {
    fn label(&self) -> &str {
        "chat-api"
    }

    async fn complete(&self, prompt: &PromptContext) -> Result<String> {
        if !self.is_configured() {
            return Err(ConclaveError::agent_unavailable(
                &self.name,
                "chat API key not configured",
            ));
        }

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!(agent = %self.name, %url, "sending chat completion request");

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConclaveError::Timeout {
                        agent: self.name.clone(),
                        elapsed_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    ConclaveError::agent_unavailable(&self.name, e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(agent = %self.name, %status, "chat API error");
            return Err(ConclaveError::agent_unavailable(
                &self.name,
                format!("chat API error: {} - {}", status, body),
            ));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ConclaveError::agent_unavailable(&self.name, format!("malformed chat response: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        debug!(agent = %self.name, chars = content.len(), "chat response received");
        Ok(content)
    }
}
