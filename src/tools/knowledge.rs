//! Data-dictionary lookup tool
//!
//! Answers field-name and usage questions from a local markdown dictionary,
//! using the injected language model to extract the relevant entry.

use crate::llm::LanguageModel;
use crate::models::Envelope;
use crate::tools::{require_str_arg, Tool};
use crate::Result;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub struct KnowledgeTool {
    model: Arc<dyn LanguageModel>,
    dictionary_path: PathBuf,
}

impl KnowledgeTool {
    pub fn new(model: Arc<dyn LanguageModel>, dictionary_path: PathBuf) -> Self {
        Self {
            model,
            dictionary_path,
        }
    }
}

#[async_trait::async_trait]
impl Tool for KnowledgeTool {
    fn name(&self) -> &'static str {
        "search_knowledge"
    }

    fn signature(&self) -> &'static str {
        "(query)"
    }

    fn description(&self) -> &'static str {
        "Search the data dictionary for correct field names and tool usage. Use this BEFORE querying unfamiliar stock data fields."
    }

    async fn execute(&self, args: &Value) -> Result<Envelope> {
        let query = require_str_arg(args, "query")?;

        let dictionary = match tokio::fs::read_to_string(&self.dictionary_path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(Envelope::error(format!(
                    "Knowledge base not readable at {}: {}",
                    self.dictionary_path.display(),
                    e
                )));
            }
        };

        let prompt = format!(
            r#"You are a data dictionary assistant. Use the provided documentation to answer the user's question accurately.

[Documentation Content]
{dictionary}

User Question: {query}

Instructions:
1. Only answer based on the provided documentation.
2. When identifying a field, ALWAYS return the exact field key and its usage example.
3. Be concise and prioritize accuracy in field names."#
        );

        match self.model.generate(&prompt).await {
            Ok(answer) => Ok(Envelope::success(json!({ "answer": answer }))),
            Err(e) => Ok(Envelope::error(format!("Knowledge lookup failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::models::EnvelopeStatus;

    #[tokio::test]
    async fn test_missing_dictionary_reports_error_envelope() {
        let tool = KnowledgeTool::new(
            Arc::new(ScriptedModel::new(vec!["unused"])),
            PathBuf::from("/nonexistent/dictionary.md"),
        );

        let envelope = tool
            .execute(&json!({"query": "key for dividend yield?"}))
            .await
            .unwrap();
        assert_eq!(envelope.status, EnvelopeStatus::Error);
        assert!(envelope.error.unwrap().contains("not readable"));
    }

    #[tokio::test]
    async fn test_answers_from_dictionary() {
        let dir = std::env::temp_dir().join(format!("knowledge-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("data_dictionary.md");
        std::fs::write(&path, "# Fields\n\ndv_ttm: dividend yield (TTM)\n").unwrap();

        let tool = KnowledgeTool::new(
            Arc::new(ScriptedModel::new(vec!["Use `dv_ttm` from daily_basic."])),
            path,
        );

        let envelope = tool
            .execute(&json!({"query": "key for dividend yield?"}))
            .await
            .unwrap();
        assert_eq!(envelope.status, EnvelopeStatus::Success);
        assert!(envelope.data.unwrap()["answer"]
            .as_str()
            .unwrap()
            .contains("dv_ttm"));
    }
}
