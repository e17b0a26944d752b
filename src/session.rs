//! Session run logging
//!
//! Every run appends one structured record to a per-session `.jsonl` file:
//! the query, a wall-clock timestamp, and each step with its latency. A
//! failed write is a diagnostic, never a reason to abort a run.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(rename = "type")]
    pub step_type: String,
    pub content: String,
    /// Seconds spent on the step, for model calls and executions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
}

impl StepRecord {
    pub fn new(step_type: &str, content: impl Into<String>, latency: Option<f64>) -> Self {
        Self {
            step_type: step_type.to_string(),
            content: content.into(),
            latency,
        }
    }
}

/// One JSON object per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub query: String,
    pub steps: Vec<StepRecord>,
}

impl LogRecord {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            query: query.into(),
            steps: Vec::new(),
        }
    }
}

/// Append-only writer for one session's log file.
///
/// Sessions own distinct file paths, so there is no cross-run contention.
pub struct SessionLogger {
    path: PathBuf,
}

impl SessionLogger {
    pub fn new(log_dir: &Path, session_id: &str) -> Self {
        Self {
            path: log_dir.join(format!("{}.jsonl", session_id)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one run record as a single JSON line.
    pub fn append(&self, record: &LogRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;

        debug!(path = %self.path.display(), "Session record appended");
        Ok(())
    }
}

/// Unique id for a fresh session.
pub fn generate_session_id() -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    format!(
        "session_{}_{}",
        chrono::Utc::now().timestamp(),
        &uuid[..8]
    )
}
