//! A-Share Analyst Agent
//!
//! A conversational financial-analysis assistant for Chinese A-share
//! stocks:
//! - A ReAct loop turns LLM responses into validated tool invocations,
//!   feeds results back, and repeats until a final answer or the step
//!   budget runs out
//! - Failed executions and empty observations become self-correction
//!   context instead of ending the run
//! - Every run streams a live transcript and appends one structured
//!   record to a per-session log file
//!
//! LOOP:
//! TASK → PROMPT → MODEL → (ACTION → EXECUTE → OBSERVE)* → ANSWER

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod provider;
pub mod sanitize;
pub mod session;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{AnalystAgent, StreamMode};
