//! Context compaction (SPEC_FULL §4.2): dump-to-disk plus an embedded
//! summary, replacing the whole conversation with one synthetic user
//! message. Triggered proactively at 75% of context (before an LLM call)
//! or reactively on `flush`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::context_window::TokenUsage;
use crate::message::{Message, MessageRole};
use crate::paths;

const DUMP_USER_ASSISTANT_CAP: usize = 5_000;
const DUMP_TOOL_CAP: usize = 2_000;
const SUMMARY_USER_CAP: usize = 500;
const SUMMARY_ASSISTANT_CAP: usize = 1_000;
const SUMMARY_OVERALL_CAP: usize = 8_000;

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("... [truncated]");
        out
    }
}

/// Writes the markdown dump file and returns its path. Does not mutate
/// the conversation — callers combine this with [`build_summary`] and
/// [`synthetic_message`].
pub fn write_dump(
    workspace: &Path,
    unix_ts: u64,
    reason: &str,
    model: &str,
    usage: &TokenUsage,
    history: &[Message],
) -> Result<std::path::PathBuf> {
    let dir = paths::context_dumps_dir(workspace);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = paths::dump_file(workspace, unix_ts);

    let mut out = String::new();
    out.push_str(&format!("# Context dump\n\n"));
    out.push_str(&format!("- timestamp: {unix_ts}\n"));
    out.push_str(&format!("- reason: {reason}\n"));
    out.push_str(&format!("- model: {model}\n"));
    out.push_str(&format!(
        "- prompt tokens (cumulative): {}\n",
        usage.prompt_tokens_cumulative
    ));
    out.push_str(&format!(
        "- completion tokens (cumulative): {}\n\n",
        usage.completion_tokens_cumulative
    ));

    for msg in history {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        let is_tool_bearing = msg.role == MessageRole::Tool || !msg.tool_calls.is_empty();
        let cap = if is_tool_bearing {
            DUMP_TOOL_CAP
        } else {
            DUMP_USER_ASSISTANT_CAP
        };
        let content = msg.content.as_deref().unwrap_or("");
        out.push_str(&format!("## {role}\n\n{}\n\n", truncate_chars(content, cap)));
        for tc in &msg.tool_calls {
            out.push_str(&format!("- tool_call: {} ({})\n", tc.name, tc.id));
        }
    }

    std::fs::write(&path, out).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Builds the compact summary embedded in the synthetic message.
pub fn build_summary(history: &[Message]) -> String {
    let mut summary = String::new();
    for msg in history {
        let content = msg.content.as_deref().unwrap_or("");
        match msg.role {
            MessageRole::User => {
                summary.push_str("User: ");
                summary.push_str(&truncate_chars(content, SUMMARY_USER_CAP));
                summary.push('\n');
            }
            MessageRole::Assistant => {
                summary.push_str("Assistant: ");
                summary.push_str(&truncate_chars(content, SUMMARY_ASSISTANT_CAP));
                summary.push('\n');
            }
            MessageRole::Tool => {
                summary.push_str(&format!("[tool result: {} chars]\n", content.chars().count()));
            }
            MessageRole::System => {}
        }
    }
    truncate_chars(&summary, SUMMARY_OVERALL_CAP)
}

/// The single synthetic user message that replaces the whole
/// conversation after compaction.
pub fn synthetic_message(dump_path: &Path, summary: &str) -> Message {
    let text = format!(
        "Context was compacted. The prior conversation was dumped to `{}`. \
         The window is effectively reset: recover specifics by calling `files grep` \
         against the `context_dumps` directory rather than reading the dump file \
         wholesale. Summary of what happened so far:\n\n{}",
        dump_path.display(),
        summary
    );
    Message::user(text)
}

/// Runs the full compaction procedure in place: writes the dump,
/// replaces `history` with the single synthetic message, and resets
/// `usage`'s cumulative counters. Returns the dump file path.
pub fn compact(
    workspace: &Path,
    unix_ts: u64,
    reason: &str,
    model: &str,
    usage: &mut TokenUsage,
    history: &mut Vec<Message>,
) -> Result<std::path::PathBuf> {
    let dump_path = write_dump(workspace, unix_ts, reason, model, usage, history)?;
    let summary = build_summary(history);
    *history = vec![synthetic_message(&dump_path, &summary)];
    usage.reset_after_compaction();
    Ok(dump_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_leaves_one_message_and_zeroed_usage() {
        let dir = tempfile::tempdir().unwrap();
        let mut usage = TokenUsage::new(128_000);
        usage.record_call(100_000, 500);
        let mut history = vec![Message::user("hello"), Message::assistant(Some("hi".into()), vec![])];

        let dump_path = compact(dir.path(), 1_700_000_000, "flush", "claude-sonnet-4-5", &mut usage, &mut history)
            .unwrap();

        assert!(dump_path.exists());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(usage.last_prompt_tokens, 0);
        assert_eq!(usage.prompt_tokens_cumulative, 0);
    }

    #[test]
    fn summary_truncates_each_role_independently() {
        let long_user = "x".repeat(10_000);
        let history = vec![Message::user(long_user)];
        let summary = build_summary(&history);
        assert!(summary.len() < 10_000);
    }
}
