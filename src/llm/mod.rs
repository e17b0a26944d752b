//! Language model boundary
//!
//! One whole-text completion per loop iteration. The production
//! implementation talks to Gemini; tests use a scripted model.

use crate::Result;
use async_trait::async_trait;

pub mod gemini;
pub use gemini::GeminiClient;

/// Trait for whole-response text completion (no token streaming).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for an assembled prompt.
    ///
    /// An empty response is an error (`AgentError::EmptyModelResponse`),
    /// never an empty string.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Scripted model for development & testing.
/// Returns canned responses in order; keeps the loop testable without LLM access.
pub struct ScriptedModel {
    responses: std::sync::Mutex<std::collections::VecDeque<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: std::sync::Mutex::new(
                responses.into_iter().map(String::from).collect(),
            ),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| crate::error::AgentError::LlmError("script lock poisoned".into()))?;
        responses
            .pop_front()
            .ok_or(crate::error::AgentError::EmptyModelResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_plays_in_order() {
        let model = ScriptedModel::new(vec!["first", "second"]);
        assert_eq!(model.generate("p").await.unwrap(), "first");
        assert_eq!(model.generate("p").await.unwrap(), "second");
        assert!(matches!(
            model.generate("p").await,
            Err(crate::error::AgentError::EmptyModelResponse)
        ));
    }
}
