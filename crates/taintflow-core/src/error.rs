use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaintFlowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("SARIF error: {0}")]
    Sarif(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    #[error("External tool error: {0}")]
    ExternalTool(String),
}

pub type Result<T> = std::result::Result<T, TaintFlowError>;
