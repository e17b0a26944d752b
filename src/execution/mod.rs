//! Action execution
//!
//! Turns one extracted action payload into a validated tool invocation.
//! The LLM never executes anything directly: the payload is parsed, the
//! tool name is checked against the registry, and only that tool runs.
//!
//! Every call is wrapped so the invocation and its (truncated) result are
//! written to a captured trace. Captured lines are then partitioned into
//! wrapper-emitted log lines and result lines, and re-assembled into the
//! collapsible blocks the chat front-end renders.

use crate::models::{Envelope, ToolAction};
use crate::tools::ToolRegistry;
use serde_json::Value;
use tracing::{debug, warn};

/// Prefixes identifying wrapper-emitted log lines in captured output.
const LOG_PREFIXES: &[&str] = &["🔧", "[*]", "->", "[!]"];

/// Result-string truncation applied to the call trace.
const RESULT_TRACE_LIMIT: usize = 200;

/// Outcome of executing one action.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// The tool ran; `observation` is the captured text fed back to the
    /// model, `rendered` the markup appended to the live transcript.
    Completed {
        observation: String,
        rendered: String,
    },
    /// Parsing, validation, or the tool itself failed.
    Failed { error: String, rendered: String },
}

/// Executes validated actions against the tool registry.
pub struct ActionExecutor {
    registry: ToolRegistry,
}

impl ActionExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one action payload extracted from a model response.
    pub async fn execute(&self, action_text: &str) -> ExecutionResult {
        // Show the payload first so a failed parse still leaves a visible
        // record of what the model asked for.
        let mut rendered = format!(
            "\n<details>\n<summary>🛠️ Tool Invocation (Click to expand)</summary>\n\n```json\n{}\n```\n</details>\n",
            action_text.trim()
        );

        let action: ToolAction = match serde_json::from_str(action_text) {
            Ok(action) => action,
            Err(e) => {
                let error = format!("Malformed action payload: {}", e);
                rendered.push_str(&render_error_block(&error));
                return ExecutionResult::Failed { error, rendered };
            }
        };

        let Some(tool) = self.registry.get(&action.tool) else {
            let available: Vec<&str> = self.registry.tools().iter().map(|t| t.name()).collect();
            let error = format!(
                "Tool '{}' is not registered. Available tools: {}",
                action.tool,
                available.join(", ")
            );
            warn!(tool = %action.tool, "Rejected action for unknown tool");
            rendered.push_str(&render_error_block(&error));
            return ExecutionResult::Failed { error, rendered };
        };

        let args = if action.args.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            action.args.clone()
        };

        debug!(tool = %action.tool, "Executing action");

        let mut captured = String::new();
        captured.push_str(&format!(
            "🔧 [Tool Call] {}({})\n",
            action.tool,
            serde_json::to_string(&args).unwrap_or_else(|_| "{}".to_string())
        ));

        match tool.execute(&args).await {
            Ok(envelope) => {
                captured.push_str(&format!(
                    "   -> [Result] {}\n",
                    truncate_chars(&compact(&envelope), RESULT_TRACE_LIMIT)
                ));
                captured.push_str(&envelope.render());
                captured.push('\n');

                let (log_str, output_str) = partition_captured(&captured);

                if !log_str.is_empty() {
                    rendered.push_str(&format!(
                        "<details><summary>🛠️ Execution Logs</summary>\n\n```text\n{}\n```\n</details>\n",
                        log_str
                    ));
                }
                if output_str.is_empty() {
                    rendered.push_str("\n*(No text output)*\n");
                } else {
                    rendered.push_str(&format!("\n### 🏁 Result\n{}\n", output_str));
                }

                let observation = if log_str.is_empty() {
                    output_str
                } else if output_str.is_empty() {
                    log_str
                } else {
                    format!("{}\n{}", log_str, output_str)
                };

                ExecutionResult::Completed {
                    observation,
                    rendered,
                }
            }
            Err(e) => {
                let error = e.to_string();
                captured.push_str(&format!("   -> [Error] {}\n", error));
                warn!(tool = %action.tool, error = %error, "Tool execution failed");
                rendered.push_str(&render_error_block(&error));
                ExecutionResult::Failed { error, rendered }
            }
        }
    }
}

fn render_error_block(error: &str) -> String {
    format!("\n### ❌ Execution Error\n```text\n{}\n```\n", error)
}

fn compact(envelope: &Envelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|_| "<unrenderable envelope>".to_string())
}

/// Split captured output into wrapper log lines and everything else.
fn partition_captured(captured: &str) -> (String, String) {
    let mut logs = Vec::new();
    let mut output = Vec::new();

    for line in captured.lines() {
        let trimmed = line.trim_start();
        if LOG_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            logs.push(line);
        } else {
            output.push(line);
        }
    }

    (
        logs.join("\n").trim().to_string(),
        output.join("\n").trim().to_string(),
    )
}

/// Truncate on a char boundary, appending a marker when shortened.
fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let cut: String = s.chars().take(limit).collect();
    format!("{}... (truncated)", cut)
}
