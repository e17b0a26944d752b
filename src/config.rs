//! Agent configuration
//!
//! Built once at each binary's entry point and injected into the agent,
//! the LLM client, and the tools. No other module reads the environment.

use std::env;
use std::path::PathBuf;

/// Maximum ReAct iterations per run before the loop reports exhaustion.
pub const DEFAULT_MAX_STEPS: usize = 15;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier passed to the LLM endpoint.
    pub model_name: String,
    /// API key for the LLM endpoint.
    pub google_api_key: String,
    /// Token for the tabular data provider.
    pub provider_token: String,
    /// Base URL of the data provider's HTTP API.
    pub provider_base_url: String,
    /// Proxy tunnel the provider must be reached through, if any.
    pub provider_proxy: Option<String>,
    /// ReAct step budget per run.
    pub max_steps: usize,
    /// Directory session logs are written under.
    pub log_dir: PathBuf,
    /// Markdown data dictionary consulted by the knowledge tool.
    pub knowledge_path: PathBuf,
    /// Port for the HTTP API binary.
    pub api_port: u16,
}

impl AgentConfig {
    /// Collect configuration from the environment.
    ///
    /// Callers are expected to have loaded `.env` already (the binaries do).
    /// Only the LLM API key is required; everything else has a default.
    pub fn from_env() -> crate::Result<Self> {
        let google_api_key = env::var("GOOGLE_API_KEY").map_err(|_| {
            crate::error::AgentError::ConfigError(
                "GOOGLE_API_KEY is not set (see .env.example)".to_string(),
            )
        })?;

        let max_steps = env::var("AGENT_MAX_STEPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_STEPS);

        let api_port = env::var("PORT")
            .or_else(|_| env::var("API_PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            model_name: env::var("MODEL_NAME")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            google_api_key,
            provider_token: env::var("TUSHARE_TOKEN").unwrap_or_default(),
            provider_base_url: env::var("TUSHARE_API_URL")
                .unwrap_or_else(|_| "http://api.tushare.pro".to_string()),
            provider_proxy: env::var("TUSHARE_PROXY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            max_steps,
            log_dir: env::var("AGENT_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            knowledge_path: env::var("KNOWLEDGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("knowledge/data_dictionary.md")),
            api_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test so the env mutations cannot race across test threads.
    #[test]
    fn test_from_env() {
        env::remove_var("GOOGLE_API_KEY");
        assert!(AgentConfig::from_env().is_err());

        env::set_var("GOOGLE_API_KEY", "test-key");
        env::remove_var("AGENT_MAX_STEPS");
        env::remove_var("TUSHARE_PROXY");

        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert!(config.provider_proxy.is_none());

        env::remove_var("GOOGLE_API_KEY");
    }
}
