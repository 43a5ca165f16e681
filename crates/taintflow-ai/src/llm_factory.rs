use crate::deepseek_provider::DeepSeekProvider;
use crate::llm_provider::LlmProvider;
use anyhow::{anyhow, Result};
use std::sync::Arc;

/// Factory for creating LLM providers based on the configured model name
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Resolve a model identifier to a configured provider.
    pub fn create(model: &str, max_retries: u32) -> Result<Arc<dyn LlmProvider>> {
        match model.to_lowercase().as_str() {
            "deepseek" | "deepseek-chat" => Ok(Arc::new(DeepSeekProvider::from_env(
                "deepseek-chat",
                max_retries,
            )?)),
            "deepseek-reasoner" => Ok(Arc::new(DeepSeekProvider::from_env(
                "deepseek-reasoner",
                max_retries,
            )?)),
            other => Err(anyhow!(
                "Unsupported model: {}. Available models: deepseek-chat, deepseek-reasoner",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_is_rejected() {
        let err = LlmProviderFactory::create("gpt-unknown", 3).unwrap_err();
        assert!(err.to_string().contains("Unsupported model"));
    }
}
