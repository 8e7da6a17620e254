//! Generative text service client.
//!
//! Every stage that needs model output goes through [`TextGenerator`], so
//! tests can script responses. [`OpenRouterClient`] is the production
//! implementation against an OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use seoagent_shared::{OpenRouterConfig, Result, SeoAgentError};

/// User-Agent string for generative requests.
const USER_AGENT: &str = concat!("seo-agent/", env!("CARGO_PKG_VERSION"));

/// One prompt for the generative service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Short label for logs (`"create"`, `"links"`, `"note"`).
    pub task: &'static str,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(task: &'static str, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task,
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Source of generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Return the model's reply. Transport and API failures are
    /// [`SeoAgentError::Generation`].
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenRouter
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenRouter (or any compatible endpoint).
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    /// Build a client, reading the API key from the configured env var.
    pub fn from_config(config: &OpenRouterConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                SeoAgentError::config(format!(
                    "{} is not set; the generative service needs an API key",
                    config.api_key_env
                ))
            })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SeoAgentError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.default_model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    #[instrument(skip_all, fields(task = request.task, model = %self.model))]
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SeoAgentError::Generation(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(300).collect();
            return Err(SeoAgentError::Generation(format!(
                "HTTP {status}: {detail}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SeoAgentError::Generation(format!("invalid response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SeoAgentError::Generation("empty completion".into()))?;

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Slice out the outermost JSON object or array from a model reply.
///
/// Models often wrap JSON in a code fence or a sentence of preamble.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}
