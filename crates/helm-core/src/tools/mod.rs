//! The tool suite (SPEC_FULL §4.4, §4.5): `browser`, `files`, `pdf`,
//! `spreadsheet`, `shell`, `cron`. Every tool is action-dispatched and
//! stateless except `browser`, which owns the one CDP connection.
//! Every action returns a single `String` — no exceptions escape to the
//! Agent Loop (SPEC_FULL §7).

pub mod browser;
pub mod cron_tool;
pub mod files;
pub mod pdf;
pub mod shell;
pub mod spreadsheet;

use std::sync::Arc;

use helm_config::Workspace;

use crate::cron::{CronRunRegistry, JobStore};
use crate::progress::ProgressBus;

/// Shared, per-agent state every tool dispatch needs. Cheap to clone
/// (everything interior is `Arc`-wrapped); one `ToolContext` is built per
/// `Agent` and handed to every `tools::dispatch` call.
#[derive(Clone)]
pub struct ToolContext {
    pub workspace: Arc<Workspace>,
    pub browser: Arc<tokio::sync::Mutex<browser::BrowserToolState>>,
    pub shell_enabled: bool,
    pub jobs_path: std::path::PathBuf,
    pub job_store: Arc<tokio::sync::Mutex<JobStore>>,
    pub cron_registry: Arc<CronRunRegistry>,
    pub progress: ProgressBus,
}

/// Dispatches one tool call by name. Never panics or propagates an
/// error: argument violations, sandbox escapes, and driver failures are
/// all folded into the returned string (SPEC_FULL §7).
pub async fn dispatch(tool: &str, args: serde_json::Value, ctx: &ToolContext) -> String {
    match tool {
        "browser" => browser::execute(args, ctx).await,
        "files" => files::execute(args, ctx).await,
        "pdf" => pdf::execute(args, ctx).await,
        "spreadsheet" => spreadsheet::execute(args, ctx).await,
        "shell" => {
            if !ctx.shell_enabled {
                "shell tool is disabled by configuration".to_string()
            } else {
                shell::execute(args, ctx).await
            }
        }
        "cron" => cron_tool::execute(args, ctx).await,
        other => format!("unknown tool '{other}'"),
    }
}

/// JSON-schema tool declarations handed to the provider on every request
/// (SPEC_FULL §4.2). Kept loose (`action` discriminator plus a free-form
/// object) rather than one schema per action — providers without a
/// structured-tool-call mode fall back to the same shape via
/// `fallback_parser`.
pub fn tool_definitions(shell_enabled: bool) -> Vec<helm_providers::Tool> {
    let mut tools = vec![
        helm_providers::Tool {
            name: "browser".to_string(),
            description: "Drive a Chromium tab: navigate, index interactive elements, click, \
                type, read text/html, screenshot, scroll, manage tabs, and search the web."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["open", "elements", "click", "type", "text", "html", "eval",
                                 "click_xy", "hover_xy", "drag_xy", "keys", "upload", "screenshot",
                                 "scroll", "newtab", "tab", "back", "forward", "refresh", "cleanup",
                                 "search"]
                    }
                },
                "required": ["action"],
                "additionalProperties": true
            }),
        },
        helm_providers::Tool {
            name: "files".to_string(),
            description: "Read, write, list, move, copy, delete files and directories, or grep \
                for a substring, all sandboxed to the workspace."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["read", "write", "list", "move", "copy", "delete", "mkdir", "info", "grep"]
                    }
                },
                "required": ["action"],
                "additionalProperties": true
            }),
        },
        helm_providers::Tool {
            name: "pdf".to_string(),
            description: "Extract text from a PDF (with an optional page range), render an HTML \
                string to a new PDF, or report page-count metadata."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["read", "create", "info"]}
                },
                "required": ["action"],
                "additionalProperties": true
            }),
        },
        helm_providers::Tool {
            name: "spreadsheet".to_string(),
            description: "Read CSV/XLSX rows (with an optional column filter), append rows to a \
                CSV, create a new CSV or XLSX workbook, or report sheet dimensions."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["read", "append", "create", "info"]}
                },
                "required": ["action"],
                "additionalProperties": true
            }),
        },
        helm_providers::Tool {
            name: "cron".to_string(),
            description: "Create, list, pause, resume, delete, or check the run status of \
                scheduled tasks."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["create", "list", "pause", "resume", "delete", "status"]}
                },
                "required": ["action"],
                "additionalProperties": true
            }),
        },
    ];

    if shell_enabled {
        tools.push(helm_providers::Tool {
            name: "shell".to_string(),
            description: "Run one shell command in the workspace directory, with a timeout."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "timeout_secs": {"type": "integer"}
                },
                "required": ["command"]
            }),
        });
    }

    tools
}
