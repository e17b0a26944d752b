//! Error types for the analysis agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Core Loop Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Empty response from model")]
    EmptyModelResponse,

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Data provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
