//! Tool trait and registry
//!
//! Tools are independent query functions, each wrapping one data-provider
//! call and returning the uniform result envelope.

use crate::config::AgentConfig;
use crate::llm::LanguageModel;
use crate::models::Envelope;
use crate::provider::ProviderClient;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod knowledge;
pub mod stock_data;

pub use knowledge::KnowledgeTool;

/// Trait for a single tool.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    /// Argument list rendered into the prompt, e.g. `(keyword)`.
    fn signature(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, args: &Value) -> Result<Envelope>;
}

/// Tool registry for looking up and enumerating tools.
///
/// Populated once at startup; insertion order is preserved so the prompt
/// lists tools deterministically. Re-registering a name overwrites.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| self.tools[slot].clone())
    }

    /// All registered tools in registration order.
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract a required string argument from a tool's JSON args.
pub(crate) fn require_str_arg(args: &Value, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            crate::error::AgentError::InvalidToolInput(format!(
                "Expected non-empty string argument '{}'",
                key
            ))
        })
}

/// Create the default registry with the stock-data and knowledge tools.
pub fn create_default_registry(
    config: &AgentConfig,
    model: Arc<dyn LanguageModel>,
) -> Result<ToolRegistry> {
    let provider = ProviderClient::from_config(config)?;
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(stock_data::SearchStockTool::new(provider.clone())));
    registry.register(Arc::new(stock_data::CurrentPriceTool::new(provider.clone())));
    registry.register(Arc::new(stock_data::FundamentalsTool::new(provider.clone())));
    registry.register(Arc::new(stock_data::IndustryStocksTool::new(
        provider.clone(),
    )));
    registry.register(Arc::new(stock_data::HistoryDataTool::new(provider)));
    registry.register(Arc::new(KnowledgeTool::new(
        model,
        config.knowledge_path.clone(),
    )));

    Ok(registry)
}
