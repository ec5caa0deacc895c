//! Files tool (SPEC_FULL §4.5): read, write, list, move, copy, delete,
//! mkdir, info, grep — all workspace-sandboxed through
//! `helm_config::Workspace::resolve`.

use serde::Deserialize;
use serde_json::Value;

use super::ToolContext;

const READ_CAP_BYTES: usize = 50 * 1024;
const GREP_OUTPUT_CAP: usize = 50;
const GREP_MAX_FILE_BYTES: u64 = 1024 * 1024;
const DEFAULT_GREP_GLOBS: &[&str] = &["*.md", "*.txt", "*.py", "*.json", "*.csv", "*.html", "*.js"];
const HIDDEN_DIRS: &[&str] = &[".git", "__pycache__", "node_modules", ".venv", "venv"];

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum FilesAction {
    Read { path: String, start: Option<usize>, end: Option<usize> },
    Write { path: String, content: String },
    List { path: Option<String> },
    Move { from: String, to: String },
    Copy { from: String, to: String },
    Delete { path: String },
    Mkdir { path: String },
    Info { path: String },
    Grep { pattern: String, globs: Option<Vec<String>> },
}

fn permission_denied(detail: &str) -> String {
    format!("Permission denied: {detail}")
}

pub async fn execute(args: Value, ctx: &ToolContext) -> String {
    let action: FilesAction = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return format!("invalid files tool arguments: {e}"),
    };
    let ws = &ctx.workspace;

    match action {
        FilesAction::Read { path, start, end } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            match std::fs::read_to_string(&resolved) {
                Ok(content) => {
                    let lines: Vec<&str> = content.lines().collect();
                    let start = start.unwrap_or(0);
                    let end = end.unwrap_or(lines.len()).min(lines.len());
                    let slice = if start < lines.len() {
                        lines[start..end].join("\n")
                    } else {
                        String::new()
                    };
                    if slice.len() > READ_CAP_BYTES {
                        let mut truncated: String = slice.chars().take(READ_CAP_BYTES).collect();
                        truncated.push_str("\n[truncated: file exceeds 50KB read cap]");
                        truncated
                    } else {
                        slice
                    }
                }
                Err(e) => format!("could not read {path}: {e}"),
            }
        }
        FilesAction::Write { path, content } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            if let Some(parent) = resolved.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            match std::fs::write(&resolved, &content) {
                Ok(()) => format!("wrote {} bytes to {path}", content.len()),
                Err(e) => format!("could not write {path}: {e}"),
            }
        }
        FilesAction::List { path } => {
            let rel = path.unwrap_or_default();
            let resolved = match ws.resolve(&rel) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            match std::fs::read_dir(&resolved) {
                Ok(entries) => {
                    let mut names: Vec<String> = entries
                        .filter_map(|e| e.ok())
                        .map(|e| {
                            let name = e.file_name().to_string_lossy().to_string();
                            if e.path().is_dir() {
                                format!("{name}/")
                            } else {
                                name
                            }
                        })
                        .collect();
                    names.sort();
                    if names.is_empty() {
                        "(empty directory)".to_string()
                    } else {
                        names.join("\n")
                    }
                }
                Err(e) => format!("could not list {rel}: {e}"),
            }
        }
        FilesAction::Move { from, to } => {
            let (from_resolved, to_resolved) = match (ws.resolve(&from), ws.resolve(&to)) {
                (Ok(f), Ok(t)) => (f, t),
                (Err(e), _) | (_, Err(e)) => return permission_denied(&e.to_string()),
            };
            if let Some(parent) = to_resolved.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            match std::fs::rename(&from_resolved, &to_resolved) {
                Ok(()) => format!("moved {from} to {to}"),
                Err(e) => format!("could not move {from} to {to}: {e}"),
            }
        }
        FilesAction::Copy { from, to } => {
            let (from_resolved, to_resolved) = match (ws.resolve(&from), ws.resolve(&to)) {
                (Ok(f), Ok(t)) => (f, t),
                (Err(e), _) | (_, Err(e)) => return permission_denied(&e.to_string()),
            };
            if let Some(parent) = to_resolved.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            match std::fs::copy(&from_resolved, &to_resolved) {
                Ok(bytes) => format!("copied {from} to {to} ({bytes} bytes)"),
                Err(e) => format!("could not copy {from} to {to}: {e}"),
            }
        }
        FilesAction::Delete { path } => {
            if path.trim_matches('/').is_empty() || path == "." {
                return permission_denied("refusing to delete the workspace root");
            }
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            if resolved == ws.root() {
                return permission_denied("refusing to delete the workspace root");
            }
            let result = if resolved.is_dir() {
                std::fs::remove_dir_all(&resolved)
            } else {
                std::fs::remove_file(&resolved)
            };
            match result {
                Ok(()) => format!("deleted {path}"),
                Err(e) => format!("could not delete {path}: {e}"),
            }
        }
        FilesAction::Mkdir { path } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            match std::fs::create_dir_all(&resolved) {
                Ok(()) => format!("created directory {path}"),
                Err(e) => format!("could not create {path}: {e}"),
            }
        }
        FilesAction::Info { path } => {
            let resolved = match ws.resolve(&path) {
                Ok(p) => p,
                Err(e) => return permission_denied(&e.to_string()),
            };
            match std::fs::metadata(&resolved) {
                Ok(meta) => format!(
                    "{path}: {} bytes, {}, modified {:?}",
                    meta.len(),
                    if meta.is_dir() { "directory" } else { "file" },
                    meta.modified().ok()
                ),
                Err(e) => format!("could not stat {path}: {e}"),
            }
        }
        FilesAction::Grep { pattern, globs } => grep(ws, &pattern, globs.as_deref()),
    }
}

fn grep(ws: &helm_config::Workspace, pattern: &str, globs: Option<&[String]>) -> String {
    let globs: Vec<String> = globs
        .map(|g| g.to_vec())
        .unwrap_or_else(|| DEFAULT_GREP_GLOBS.iter().map(|s| s.to_string()).collect());
    let pattern_lower = pattern.to_lowercase();

    let mut matches = Vec::new();
    for entry in walkdir::WalkDir::new(ws.root())
        .into_iter()
        .filter_entry(|e| {
            if e.file_type().is_dir() {
                let name = e.file_name().to_string_lossy();
                return !HIDDEN_DIRS.contains(&name.as_ref()) && !name.starts_with('.');
            }
            true
        })
        .filter_map(|e| e.ok())
    {
        if matches.len() >= GREP_OUTPUT_CAP {
            break;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !globs.iter().any(|g| glob_match(g, &name)) {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(0) > GREP_MAX_FILE_BYTES {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let rel = entry.path().strip_prefix(ws.root()).unwrap_or(entry.path());
        for (line_no, line) in content.lines().enumerate() {
            if matches.len() >= GREP_OUTPUT_CAP {
                break;
            }
            if line.to_lowercase().contains(&pattern_lower) {
                matches.push(format!("{}:{}: {}", rel.display(), line_no + 1, line.trim()));
            }
        }
    }

    if matches.is_empty() {
        format!("no matches for '{pattern}'")
    } else {
        matches.join("\n")
    }
}

fn glob_match(glob: &str, name: &str) -> bool {
    match glob.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => glob == name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::{CronRunRegistry, JobStore};
    use crate::progress::ProgressBus;
    use crate::tools::browser::BrowserToolState;
    use std::sync::Arc;

    fn context(ws_root: &std::path::Path) -> ToolContext {
        ToolContext {
            workspace: Arc::new(helm_config::Workspace::new(ws_root).unwrap()),
            browser: Arc::new(tokio::sync::Mutex::new(BrowserToolState::new(9222, ws_root.join("profile"), None))),
            shell_enabled: true,
            jobs_path: ws_root.join("jobs.json"),
            job_store: Arc::new(tokio::sync::Mutex::new(JobStore::default())),
            cron_registry: CronRunRegistry::new(),
            progress: ProgressBus::new(),
        }
    }

    #[tokio::test]
    async fn path_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = execute(serde_json::json!({"action": "read", "path": "../../../etc/passwd"}), &ctx).await;
        assert!(result.starts_with("Permission denied"));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        execute(serde_json::json!({"action": "write", "path": "a.txt", "content": "hello"}), &ctx).await;
        let result = execute(serde_json::json!({"action": "read", "path": "a.txt"}), &ctx).await;
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn delete_refuses_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = execute(serde_json::json!({"action": "delete", "path": "."}), &ctx).await;
        assert!(result.starts_with("Permission denied"));
    }

    #[tokio::test]
    async fn grep_finds_substring_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        execute(serde_json::json!({"action": "write", "path": "notes.md", "content": "Hello World\nsecond line"}), &ctx).await;
        let result = execute(serde_json::json!({"action": "grep", "pattern": "hello"}), &ctx).await;
        assert!(result.contains("notes.md"));
    }
}
