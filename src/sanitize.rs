//! Prior-turn history sanitizer
//!
//! Prior turns re-enter the prompt on every run. Anything the agent
//! previously disclosed as reasoning or execution trace must not come back
//! as context, or the model starts re-reasoning over its own scratch-work.
//! The filter is lossy on purpose: it keeps final answers and `User:` lines
//! and drops presentation markup and status chatter.

use regex::Regex;
use std::sync::OnceLock;

fn details_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<details[^>]*>.*?</details>").unwrap())
}

fn thinking_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Thinking about.*?(\(Attempt \d+\))?").unwrap())
}

/// Clean prior turns before they re-enter a prompt.
///
/// Turns that end up empty after cleaning are dropped entirely.
pub fn sanitize_history(history: &[String]) -> Vec<String> {
    let mut clean_history = Vec::with_capacity(history.len());

    for turn in history {
        let without_details = details_block_re().replace_all(turn, "");

        let mut surviving_lines = Vec::new();
        for raw_line in without_details.split('\n') {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            // Status chatter; only "User:" lines survive this group.
            if line.starts_with("Thinking about") || line.starts_with("running code") {
                continue;
            }

            if line.starts_with("Assistant:") {
                if line.contains("Thinking about") {
                    let stripped = thinking_marker_re().replace_all(line, "");
                    let stripped = stripped.trim();
                    if stripped == "Assistant:" {
                        continue;
                    }
                    surviving_lines.push(stripped.to_string());
                } else {
                    surviving_lines.push(line.to_string());
                }
                continue;
            }

            surviving_lines.push(line.to_string());
        }

        let final_line = surviving_lines.join("\n");
        if !final_line.is_empty() {
            clean_history.push(final_line);
        }
    }

    clean_history
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_strips_details_blocks_across_newlines() {
        let history = turns(&[
            "Assistant: <details open>\n<summary>💡 思考过程</summary>\ninternal trace\n</details>\n总结: 平安银行的代码是 000001.SZ",
        ]);
        let clean = sanitize_history(&history);
        assert_eq!(clean.len(), 1);
        assert!(!clean[0].contains("internal trace"));
        assert!(clean[0].contains("000001.SZ"));
    }

    #[test]
    fn test_drops_noise_lines_keeps_user_lines() {
        let history = turns(&[
            "User: 茅台现在多少钱?",
            "Thinking about '茅台现在多少钱?'... (Attempt 1)\nrunning code...\n总结: 1688 元",
        ]);
        let clean = sanitize_history(&history);
        assert_eq!(clean[0], "User: 茅台现在多少钱?");
        assert_eq!(clean[1], "总结: 1688 元");
    }

    #[test]
    fn test_strips_embedded_thinking_marker_from_assistant_line() {
        let history = turns(&["Assistant: Thinking about '茅台' (Attempt 1)"]);
        // Nothing of substance survives, so the turn disappears.
        assert!(sanitize_history(&history).is_empty());
    }

    #[test]
    fn test_empty_turn_dropped() {
        let history = turns(&["<details>\nonly trace\n</details>"]);
        assert!(sanitize_history(&history).is_empty());
    }

    #[test]
    fn test_idempotent_on_clean_input() {
        let history = turns(&["User: what is PE?", "Assistant: PE is price over earnings."]);
        let once = sanitize_history(&history);
        let twice = sanitize_history(&once);
        assert_eq!(once, twice);
        assert_eq!(once, history);
    }
}
