//! Prompt assembly
//!
//! One prompt string per model call: static instructions, sanitized
//! conversation history, the current run's step trace, and a trailing cue.

use crate::models::Step;
use crate::sanitize::sanitize_history;
use crate::tools::ToolRegistry;

/// Build the static instructions block: tool enumeration plus the output
/// format and behavioral rules the loop depends on.
fn build_system_prompt(registry: &ToolRegistry) -> String {
    let today = chrono::Local::now().format("%Y-%m-%d");

    let tool_descriptions: Vec<String> = registry
        .tools()
        .iter()
        .map(|tool| format!("- {}{}: {}", tool.name(), tool.signature(), tool.description()))
        .collect();

    format!(
        r#"You are '小亮' (XiaoLiang), a professional financial analysis agent for Chinese A-share stocks.
**Current Date: {today}**

### Core Mission: Efficiency First
- Provide direct, concise answers for factual queries (stock price, code lookup).
- If you have the answer, STOP. Do not run additional tools or deep analysis unless explicitly requested (terms like "分析", "诊断", "deep dive").
- Avoid repeating the same data multiple times in your responses.

### Available Tools
{tools}

### Output Format
- To call a tool, emit exactly ONE fenced block per step:
```action
{{"tool": "<tool_name>", "args": {{...}}}}
```
- Use ONLY the listed tools, with the listed argument names.
- Every tool returns an envelope: {{"status": "success"|"empty"|"error", "data": ..., "meta": ..., "error": ...}}. Check "status" BEFORE reading "data". When status is "empty", follow "meta.hint" for the corrective next step.

### CRITICAL RULES
**Rule #1: NO GUESSING.** Use `search_knowledge` for field names and `search_stock` for codes.
**Rule #2: PHASE-RESTRICTED REPORTING.** Keep thoughts technical and brief while calling tools. Once done, reply WITHOUT an action block, starting with **`总结:`** or **`Final Answer:`** — that reply is your final summary.
**Rule #3: NO HTML TAGS.** Do NOT use `<details>`, `<summary>`, or any other HTML tags. These are reserved for the system UI."#,
        today = today,
        tools = tool_descriptions.join("\n"),
    )
}

/// Assemble the full prompt for the next model call.
///
/// `steps` is the current run's memory; the initial task is restated in the
/// trailer rather than repeated inside the trace. History is omitted
/// entirely when no prior turns survive sanitizing.
pub fn build_prompt(
    registry: &ToolRegistry,
    task: &str,
    steps: &[Step],
    history: &[String],
) -> String {
    let system = build_system_prompt(registry);

    let clean_history = sanitize_history(history);
    let context_str = if clean_history.is_empty() {
        String::new()
    } else {
        format!("\n\nConversation History:\n{}", clean_history.join("\n"))
    };

    let steps_str = steps
        .iter()
        .filter(|step| !step.is_task())
        .map(Step::render)
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{system}{context_str}\n\nCurrent Task: {task}\n\nExisting Steps:\n{steps_str}\n\nYour Next Step:"
    )
}
