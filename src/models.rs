//! Core data models for the analysis agent

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

//
// ================= Run Memory =================
//

/// One unit of recorded run history.
///
/// The first step of any run is always exactly one `Task`; an `Action` is
/// always followed by exactly one of `Observation` or `Error` before the
/// next `Thought`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The original user question, created once at run start.
    Task(String),
    /// Raw text returned by the model for one iteration.
    Thought(String),
    /// The action payload extracted from a thought (JSON text).
    Action(String),
    /// Captured output of executing an action, or a synthetic warning.
    Observation(String),
    /// Description of a failure raised while executing an action.
    Error(String),
}

impl Step {
    /// Plain-text block used when re-serializing the run into the next prompt.
    pub fn render(&self) -> String {
        match self {
            Step::Task(task) => format!("User Task: {}", task),
            Step::Thought(thought) => format!("Thought: {}", thought),
            Step::Action(action) => format!("Action:\n```action\n{}\n```", action),
            Step::Observation(output) => format!("Observation:\n{}", output),
            Step::Error(error) => format!(
                "Execution Error:\n{}\n[Tip: Use a different tool or arguments and try again.]",
                error
            ),
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, Step::Task(_))
    }
}

//
// ================= Run Outcome =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// An explicit completion marker terminated the loop.
    Success,
    /// The step budget ran out before a terminal answer appeared.
    Exhausted,
    /// The model became unusable or the caller stopped consuming.
    Failed,
}

/// Result of one loop invocation for a single user message.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Final answer text when `status` is `Success`.
    pub final_answer: Option<String>,
    /// The fully rendered transcript, as last emitted to the caller.
    pub transcript: String,
    /// Model calls performed before termination.
    pub steps_taken: usize,
    pub session_id: String,
    /// The run's step memory, in order. The first entry is always the task.
    pub memory: Vec<Step>,
}

//
// ================= Structured Action =================
//

/// The action a model response asks the loop to perform: one named tool
/// invocation with JSON arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolAction {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

//
// ================= Result Envelope =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Empty,
    Error,
}

impl fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvelopeStatus::Success => "success",
            EnvelopeStatus::Empty => "empty",
            EnvelopeStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// The uniform return contract for every data tool.
///
/// `success` implies `data` is present; `empty` means the query was valid but
/// matched nothing (with `meta.hint` suggesting a corrective next action);
/// `error` carries diagnostic text in `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub status: EnvelopeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            data: Some(data),
            meta: Map::new(),
            error: None,
        }
    }

    pub fn empty(hint: impl Into<String>) -> Self {
        let mut meta = Map::new();
        meta.insert("hint".to_string(), Value::String(hint.into()));
        Self {
            status: EnvelopeStatus::Empty,
            data: None,
            meta,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            data: None,
            meta: Map::new(),
            error: Some(message.into()),
        }
    }

    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    /// Text form fed back to the model as an observation.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| format!("{{\"status\": \"{}\"}}", self.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_render_forms() {
        assert_eq!(
            Step::Task("find PE of 平安银行".into()).render(),
            "User Task: find PE of 平安银行"
        );
        assert!(Step::Action("{\"tool\": \"search_stock\"}".into())
            .render()
            .starts_with("Action:\n```action\n"));
        let error = Step::Error("tool exploded".into()).render();
        assert!(error.contains("tool exploded"));
        assert!(error.contains("[Tip:"));
    }

    #[test]
    fn test_envelope_success_has_data() {
        let env = Envelope::success(json!([{"code": "000001.SZ"}]));
        assert_eq!(env.status, EnvelopeStatus::Success);
        assert!(env.data.is_some());
        assert!(env.error.is_none());
    }

    #[test]
    fn test_envelope_empty_carries_hint() {
        let env = Envelope::empty("try the previous trading day");
        assert_eq!(env.status, EnvelopeStatus::Empty);
        assert!(env.data.is_none());
        assert_eq!(
            env.meta.get("hint").and_then(Value::as_str),
            Some("try the previous trading day")
        );
    }

    #[test]
    fn test_envelope_render_round_trip() {
        let env = Envelope::error("provider returned 500");
        let parsed: Envelope = serde_json::from_str(&env.render()).unwrap();
        assert_eq!(parsed.status, EnvelopeStatus::Error);
        assert_eq!(parsed.error.as_deref(), Some("provider returned 500"));
        assert!(parsed.data.is_none());
    }

    #[test]
    fn test_tool_action_deserialization() {
        let action: ToolAction =
            serde_json::from_str(r#"{"tool": "get_current_price", "args": {"stock_code": "600519.SH"}}"#)
                .unwrap();
        assert_eq!(action.tool, "get_current_price");
        assert_eq!(action.args["stock_code"], "600519.SH");

        // args may be omitted entirely
        let bare: ToolAction = serde_json::from_str(r#"{"tool": "search_stock"}"#).unwrap();
        assert!(bare.args.is_null());
    }
}
