use crate::llm_provider::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEEPSEEK_API_BASE: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Configuration for the DeepSeek provider (OpenAI-compatible chat API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSeekConfig {
    /// API key for DeepSeek
    pub api_key: String,
    /// Base URL for the API
    pub base_url: String,
    /// Model to use ("deepseek-chat" or "deepseek-reasoner")
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries for failed requests
    pub max_retries: u32,
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).unwrap_or_default(),
            base_url: DEEPSEEK_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 600,
            max_retries: 3,
        }
    }
}

/// DeepSeek LLM provider
#[derive(Debug)]
pub struct DeepSeekProvider {
    config: DeepSeekConfig,
    client: Client,
}

impl DeepSeekProvider {
    /// Create a new DeepSeek provider
    pub fn new(config: DeepSeekConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!(
                "DeepSeek API key is required. Set {} environment variable.",
                API_KEY_ENV
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env(model: impl Into<String>, max_retries: u32) -> Result<Self> {
        Self::new(DeepSeekConfig {
            model: model.into(),
            max_retries,
            ..Default::default()
        })
    }

    /// Send a request to the chat completions endpoint with retry logic
    async fn send_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ChatResponse> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self.try_request(messages, config).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        tracing::warn!(
                            "DeepSeek request failed (attempt {}/{}), retrying...",
                            attempt + 1,
                            self.config.max_retries + 1
                        );
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All retry attempts failed")))
    }

    /// Try a single request
    async fn try_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ChatResponse> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: Some(config.temperature),
            max_tokens: config.max_tokens,
            response_format: config.json_object.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to DeepSeek API")?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(anyhow!("DeepSeek API error ({}): {}", status, error_text));
        }

        response
            .json::<ChatResponse>()
            .await
            .context("Failed to parse DeepSeek API response")
    }
}

#[async_trait]
impl LlmProvider for DeepSeekProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        let response = self.send_request(messages, config).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("DeepSeek response contained no choices"))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning_content,
            model: response.model,
            total_tokens: response.usage.map(|u| u.total_tokens),
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        "deepseek"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: usize,
}
