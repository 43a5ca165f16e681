pub mod deepseek_provider;
pub mod llm_factory;
pub mod llm_provider;

pub use deepseek_provider::{DeepSeekConfig, DeepSeekProvider};
pub use llm_factory::LlmProviderFactory;
pub use llm_provider::*;
