//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::AgentConfig;
use crate::error::AgentError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model_name: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model_name: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model_name,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.google_api_key.clone(), config.model_name.clone())
    }
}

#[async_trait]
impl super::LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(AgentError::LlmError(
                "GOOGLE_API_KEY not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/{}:generateContent?key={}",
            GENERATE_URL, self.model_name, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
        };

        info!(model = %self.model_name, "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AgentError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AgentError::LlmError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AgentError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or(AgentError::EmptyModelResponse)?;

        Ok(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
