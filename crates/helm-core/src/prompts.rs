//! System prompt template (SPEC_FULL §4.2): interpolated fresh on every
//! call with workspace path, date, context limit, and live token
//! pressure. A sub-agent overrides this entirely (see `helm-planner`).

use crate::context_window::TokenUsage;

pub const MAIN_AGENT_SYSTEM_PROMPT: &str = r#"You are a browser-automation agent. You drive a real Chromium instance
over the Chrome DevTools Protocol and can read/write files, run shell
commands, and manipulate spreadsheets and PDFs within your workspace.

Workspace: {workspace}
Today's date: {date}
Model context window: {context_limit} tokens
Last measured prompt size: {last_prompt_tokens} tokens ({percentage_used}% of window)

Use the `browser` tool to navigate, index interactive elements, click,
type, and extract text/html from the page. Element indices come from the
most recent `elements` call and are invalidated by navigation. Use
`files`, `pdf`, `spreadsheet`, `shell`, and `cron` for everything else
your task needs within the workspace. Never attempt to access paths
outside the workspace.
"#;

pub fn render_system_prompt(workspace: &str, context_limit: u32, usage: &TokenUsage) -> String {
    let percentage_used = (usage.percentage_used() * 100.0).round();
    MAIN_AGENT_SYSTEM_PROMPT
        .replace("{workspace}", workspace)
        .replace("{date}", &chrono::Utc::now().format("%Y-%m-%d").to_string())
        .replace("{context_limit}", &context_limit.to_string())
        .replace("{last_prompt_tokens}", &usage.last_prompt_tokens.to_string())
        .replace("{percentage_used}", &percentage_used.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_interpolates_all_placeholders() {
        let usage = TokenUsage::new(100_000);
        let rendered = render_system_prompt("/tmp/ws", 100_000, &usage);
        assert!(!rendered.contains('{'));
        assert!(rendered.contains("/tmp/ws"));
    }
}
