use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for LLM operations
pub type LlmResult<T> = anyhow::Result<T>;

/// Configuration for generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature for sampling (0.0 to 2.0)
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
    /// Ask the provider to constrain the response to a single JSON object
    pub json_object: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
            json_object: false,
        }
    }
}

impl GenerationConfig {
    /// Configuration for the strict JSON response contracts used by the
    /// specification and triage prompts.
    pub fn json() -> Self {
        Self {
            json_object: true,
            ..Default::default()
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Response from the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text content
    pub content: String,
    /// Chain-of-thought text for reasoning models; never required for
    /// correctness, logged separately when present
    pub reasoning: Option<String>,
    /// Model that produced the response
    pub model: String,
    /// Total tokens used in the request
    pub total_tokens: Option<usize>,
    /// Finish reason (e.g., "stop", "length")
    pub finish_reason: Option<String>,
}

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync + fmt::Debug {
    /// Generate a completion for a single system + user prompt pair
    async fn generate(&self, system: &str, prompt: &str) -> LlmResult<LlmResponse> {
        let messages = vec![Message::system(system), Message::user(prompt)];
        self.generate_chat(&messages, &GenerationConfig::default())
            .await
    }

    /// Generate a chat completion with message history
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse>;

    /// Get the name of this provider
    fn provider_name(&self) -> &str;

    /// Get the model identifier
    fn model_name(&self) -> &str;
}
